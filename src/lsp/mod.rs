mod server;

use tower_lsp::{LspService, Server};

use server::Backend;

/// Serves the language server over stdio until the client exits.
pub async fn serve_stdio() {
    let (service, socket) = LspService::new(Backend::new);
    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(service)
        .await;
}
