//! Authentication module for Paychat

pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod session;
pub mod supabase;

pub use identity::{AuthError, AuthUser, IdentityProvider, SessionTokens, SignUpOutcome};
pub use jwt::{Claims, JwtVerifier};
pub use middleware::{
    classify_path, gate_decision, login_redirect, resolve_session, session_gate, CookieAction,
    GateDecision, PathClass, Session,
};
pub use session::{CookieJar, PresentedTokens};
pub use supabase::SupabaseAuth;
