//! therec: record therapy sessions in the terminal and stream them to the
//! backend as a chunked multipart upload.

mod api;
mod app;
mod commands;
mod config;
mod logging;
mod recording;
mod ui;
mod upload;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    app::run().await
}
