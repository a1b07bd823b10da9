/// Irreversible, device-wide power-off.
///
/// Implementations must not return control in a way that lets the caller
/// keep throttling; the controller stops ticking after calling this.
pub trait PowerControl: Send + Sync {
    fn critical_shutdown(&self);
}
