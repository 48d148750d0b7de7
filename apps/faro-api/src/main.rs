use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = faro_api::Args::parse();
	faro_api::run(args).await
}
