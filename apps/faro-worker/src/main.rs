use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = faro_worker::Args::parse();
	faro_worker::run(args).await
}
