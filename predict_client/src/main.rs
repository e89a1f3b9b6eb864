use std::path::PathBuf;

use clap::Parser;
use env_logger::TimestampPrecision;
use predict_client::{Error, PredictClient};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the predict server to connect to
    #[clap(long, default_value = "127.0.0.1:6060")]
    address: String,

    /// Image file to annotate
    #[clap(long)]
    input: PathBuf,

    /// Where to write the annotated JPEG
    #[clap(long, default_value = "annotated.jpg")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let client = PredictClient::new(&args.address);
    if let Err(err) = client.predict_file(&args.input, &args.output).await {
        log::error!("Annotating {} failed\n{}", args.input.display(), err);
        return Err(err);
    }

    Ok(())
}
