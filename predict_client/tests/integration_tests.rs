use std::{io::Cursor, net::SocketAddr, sync::Arc};

use image::{Rgb, RgbImage};
use predict_client::{Error, PredictClient};
use predict_server::{
    annotate::BoxAnnotator,
    detections::{Bbox, Detection, Detections},
    endpoints::{router, AppState},
    nn::InferModel,
    pipeline::Pipeline,
    registry::ModelRegistry,
    slicer::{InferenceSlicer, SlicerConfig},
};

struct CornerModel;

impl InferModel for CornerModel {
    fn infer(&self, _image: &RgbImage) -> anyhow::Result<Detections> {
        Ok(Detections::from(vec![Detection::new(
            Bbox::new(1.0, 1.0, 12.0, 12.0),
            0,
            0.9,
        )]))
    }
}

fn spawn_server() -> Result<SocketAddr, Error> {
    let pipeline = Pipeline::new(
        InferenceSlicer::new(SlicerConfig::default())?,
        BoxAnnotator::default(),
        95,
    );
    let state = Arc::new(AppState::new(
        ModelRegistry::preloaded("corner", Arc::new(CornerModel)),
        pipeline,
        false,
    ));

    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    let server = axum::Server::from_tcp(listener)?
        .serve(router(state, 4 * 1024 * 1024).into_make_service());
    tokio::spawn(server);

    Ok(addr)
}

fn png_bytes(width: u32, height: u32) -> Result<Vec<u8>, Error> {
    let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageOutputFormat::Png)?;
    Ok(buf.into_inner())
}

#[tokio::test]
async fn test_predict_round_trip() -> Result<(), Error> {
    let addr = spawn_server()?;
    let client = PredictClient::new(&addr.to_string());

    let annotated = client.predict(&png_bytes(120, 80)?).await?;
    let image = image::load_from_memory_with_format(&annotated, image::ImageFormat::Jpeg)?;

    assert_eq!((image.width(), image.height()), (120, 80));
    Ok(())
}

#[tokio::test]
async fn test_server_errors_surface() -> Result<(), Error> {
    let addr = spawn_server()?;
    let client = PredictClient::new(&addr.to_string());

    let err = client.predict(b"definitely not an image").await.err();
    assert_eq!(
        err.map(|e| e.to_string()),
        Some("server error: Invalid image data".to_owned())
    );

    Ok(())
}

#[tokio::test]
async fn test_predict_file() -> Result<(), Error> {
    let addr = spawn_server()?;
    let client = PredictClient::new(&addr.to_string());

    let dir = std::env::temp_dir().join(format!("predict_client-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let (input, output) = (dir.join("input.png"), dir.join("output.jpg"));
    std::fs::write(&input, png_bytes(50, 40)?)?;

    client.predict_file(&input, &output).await?;

    let image = image::open(&output)?;
    assert_eq!((image.width(), image.height()), (50, 40));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
