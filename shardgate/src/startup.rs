use tokio::net::TcpListener;

use crate::{App, executor, handlers::app};

/// Serve the gate on `listener` until the process is stopped.
pub async fn run(listener: TcpListener, router: executor::Router) -> std::io::Result<()> {
    let a = App::new(router);

    let app = app(a);
    axum::serve(listener, app.into_make_service()).await
}
