// ── Host capability seams ──
//
// Authorization is consulted once per radio operation; a denial is a
// first-class failure surfaced on the event bus. Keep-alive is the
// platform hook that stops the process being reclaimed mid-session.

/// Permission gate consulted before every radio operation.
pub trait AuthorizationGate: Send + Sync + 'static {
    fn has_scan_authorization(&self) -> bool;
    fn has_connect_authorization(&self) -> bool;
}

/// Gate for hosts without a permission model.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AuthorizationGate for AllowAll {
    fn has_scan_authorization(&self) -> bool {
        true
    }

    fn has_connect_authorization(&self) -> bool {
        true
    }
}

/// Foreground / keep-alive status for the lifetime of a live link.
pub trait KeepAlive: Send + Sync + 'static {
    fn promote(&self, peripheral_name: &str);
    fn demote(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeepAlive;

impl KeepAlive for NoKeepAlive {
    fn promote(&self, _peripheral_name: &str) {}

    fn demote(&self) {}
}
