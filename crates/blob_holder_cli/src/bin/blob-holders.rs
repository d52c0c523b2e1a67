use clap::Parser;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = blob_holder_cli::BlobHolders::parse();
    blob_holder_trace::init_fmt(cli.structured)?;
    let output = cli.run().await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
