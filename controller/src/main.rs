mod devices;
mod host;
mod web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
