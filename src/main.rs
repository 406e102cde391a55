#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ski_sage_lib::run().await
}
