use clap::Parser;
use common::{Environment, setup_logging};
use smoke::report::{TOP_DETECTIONS, describe_health, describe_prediction};
use smoke::{Reply, SmokeClient};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_IMAGE_URL: &str = "https://ultralytics.com/images/bus.jpg";

#[derive(Parser, Debug)]
#[command(name = "smoke", about = "Check a deployed detection gateway end to end")]
struct Args {
    /// Gateway base URL, e.g. https://my-app.example.com
    base_url: String,

    /// Optional local image to upload after the sample image
    image_path: Option<PathBuf>,

    /// Sample image downloaded and uploaded to /api/predict
    #[arg(long, default_value = DEFAULT_IMAGE_URL)]
    image_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(Environment::from_env());

    let client = SmokeClient::new(&args.base_url, Duration::from_secs(args.timeout_secs))?;
    println!("Testing deployment at: {}", client.base_url());

    println!("\nHealth endpoint");
    match client.health().await? {
        Reply::Ok { status, body } => {
            println!("Status: {status}");
            println!("{}", describe_health(&body));
        }
        Reply::Failed { status, body } => {
            println!("Status: {status}");
            println!("Error: {body}");
        }
    }

    println!("\nPrediction with image URL: {}", args.image_url);
    let sample = client.download(&args.image_url).await?;
    let file_name = args
        .image_url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("image.jpg");
    print_prediction(client.predict(file_name, sample).await?);

    match args.image_path.as_deref() {
        None => println!("\nSkipping local image test (no image provided)"),
        Some(path) if !path.exists() => {
            println!("\nImage file not found: {}", path.display());
        }
        Some(path) => {
            println!("\nPrediction with local image: {}", path.display());
            let bytes = tokio::fs::read(path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image.jpg".to_string());
            print_prediction(client.predict(&name, bytes).await?);
        }
    }

    println!("\nSmoke checks completed");
    Ok(())
}

fn print_prediction(reply: Reply<schema::PredictResponse>) {
    println!("Status: {}", reply.status());
    match reply {
        Reply::Ok { body, .. } => println!("{}", describe_prediction(&body, TOP_DETECTIONS)),
        Reply::Failed { body, .. } => println!("Error: {body}"),
    }
}
