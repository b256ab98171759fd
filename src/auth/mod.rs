mod cookie;
mod gate;
mod session;

pub use cookie::{
    RawCookie, SessionCookie, clear_cookie_headers, read_cookie, session_cookie_headers,
    with_cookies,
};
pub use gate::{
    GateDecision, HOME_PATH, LOGIN_PATH, decide, is_auth_path, is_exempt_path, session_gate,
};
pub use session::{AuthError, MaybeSession, RequireAdmin, RequireSession, Session};
