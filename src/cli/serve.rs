use std::sync::Arc;

use tracing::info;

use super::{BackendArgs, ServeArgs};
use crate::backend::connect;
use crate::server::{AppState, create_router};

pub async fn run_serve(backend_args: BackendArgs, serve_args: ServeArgs) -> anyhow::Result<()> {
    let file = backend_args.load_file()?;
    let mut backend_config = backend_args.resolve(&file)?;
    let config = serve_args.resolve(&file, &backend_config.data_dir);

    // Local object URLs point back at this server's storage proxy.
    backend_config.public_base_url = Some(config.base_url());
    let backend = connect(&backend_config)?;
    info!(
        backend = %backend_config.kind,
        bucket = %backend_config.bucket,
        "Backend ready"
    );

    let state = Arc::new(AppState::new(
        backend,
        config.clone(),
        backend_config.bucket.clone(),
    ));
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
