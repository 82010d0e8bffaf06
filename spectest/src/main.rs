#[tokio::main]
async fn main() -> eyre::Result<()> {
    spectest::App::new().run().await
}
