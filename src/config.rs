mod backend;
mod file;
mod server;

pub use backend::{BackendConfig, BackendKind, DEFAULT_BUCKET, SupabaseConfig};
pub use file::FileConfig;
pub use server::{DEFAULT_SESSION_COOKIE, ServerConfig};
