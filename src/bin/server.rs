use std::net::SocketAddr;

use axum::{http::StatusCode, routing::post, Json, Router};
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::ImageEncoder;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use wavemesh::config::Params;
use wavemesh::{render, scenarios, WaveSource};

#[derive(Deserialize)]
struct BuildRequestBody {
    scenario: Option<String>,
    wavelength: Option<f32>,
    direction_deg: Option<f32>,
    amplitude: Option<f32>,
    phase_offset: Option<f32>,
    tide_height: Option<f32>,
    // Build parameter overrides
    vertex_spacing: Option<f32>,
    step_size: Option<f32>,
    decimation_tolerance: Option<f32>,
    diffraction_iterations: Option<usize>,
    upwave_margin: Option<f32>,
    downwave_margin: Option<f32>,
    crosswave_margin: Option<f32>,
    max_segment_points: Option<usize>,
    min_energy: Option<f32>,
    // Output resolution
    width: Option<usize>,
    height: Option<usize>,
}

#[derive(Serialize)]
struct BuildResponse {
    layers: Vec<Layer>,
    timings: Vec<TimingEntry>,
    steps: usize,
    merges: usize,
    splits: usize,
    vertex_count: usize,
    triangle_count: usize,
    vertices_before_decimation: usize,
    width: usize,
    height: usize,
}

#[derive(Serialize)]
struct Layer {
    name: String,
    data_url: String,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

fn encode_png(rgba: &[u8], w: usize, h: usize) -> String {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    encoder
        .write_image(rgba, w as u32, h as u32, image::ExtendedColorType::Rgba8)
        .expect("PNG encode failed");
    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    format!("data:image/png;base64,{}", b64)
}

async fn build_handler(
    Json(req): Json<BuildRequestBody>,
) -> Result<Json<BuildResponse>, (StatusCode, String)> {
    let scenario = req.scenario.unwrap_or_else(|| "island".into());
    let wavelength = req.wavelength.unwrap_or(30.0);
    let direction = req.direction_deg.unwrap_or(0.0).to_radians();
    let amplitude = req.amplitude.unwrap_or(1.0);
    let phase_offset = req.phase_offset.unwrap_or(0.0);
    let tide_height = req.tide_height.unwrap_or(0.0);
    let width = req.width.unwrap_or(1024);
    let height = req.height.unwrap_or(512);

    let defaults = Params::default();
    let params = Params {
        vertex_spacing: req.vertex_spacing.unwrap_or(defaults.vertex_spacing),
        step_size: req.step_size.unwrap_or(defaults.step_size),
        decimation_tolerance: req
            .decimation_tolerance
            .unwrap_or(defaults.decimation_tolerance),
        diffraction_iterations: req
            .diffraction_iterations
            .unwrap_or(defaults.diffraction_iterations),
        upwave_margin: req.upwave_margin.unwrap_or(defaults.upwave_margin),
        downwave_margin: req.downwave_margin.unwrap_or(defaults.downwave_margin),
        crosswave_margin: req.crosswave_margin.unwrap_or(defaults.crosswave_margin),
        max_segment_points: req.max_segment_points.unwrap_or(defaults.max_segment_points),
        min_energy: req.min_energy.unwrap_or(defaults.min_energy),
    };

    let Some(terrain) = scenarios::by_name(&scenario) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("unknown scenario '{scenario}'"),
        ));
    };

    let response = tokio::task::spawn_blocking(move || {
        let source = WaveSource {
            amplitude,
            wavelength,
            direction,
            phase_offset,
        };
        let (mesh, stats) = wavemesh::build_wave_mesh(&source, &terrain, tide_height, &params)
            .map_err(|e| e.to_string())?;

        let layers = vec![
            Layer {
                name: "amplitude".into(),
                data_url: encode_png(&render::render_amplitude(&mesh, width, height), width, height),
            },
            Layer {
                name: "breaking".into(),
                data_url: encode_png(&render::render_breaking(&mesh, width, height), width, height),
            },
            Layer {
                name: "blend".into(),
                data_url: encode_png(&render::render_blend(&mesh, width, height), width, height),
            },
            Layer {
                name: "depth".into(),
                data_url: encode_png(
                    &render::render_depth(&terrain, &mesh, width, height),
                    width,
                    height,
                ),
            },
        ];

        let timings = stats
            .timings
            .iter()
            .map(|t| TimingEntry {
                name: t.name.to_string(),
                ms: t.ms,
            })
            .collect();

        Ok::<_, String>(BuildResponse {
            layers,
            timings,
            steps: stats.steps,
            merges: stats.merges,
            splits: stats.splits,
            vertex_count: mesh.vertex_count,
            triangle_count: mesh.index_count / 3,
            vertices_before_decimation: stats.vertices_before,
            width,
            height,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e))?;

    Ok(Json(response))
}

#[tokio::main]
async fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .ok();

    let frontend = ServeDir::new("frontend");

    let app = Router::new()
        .route("/api/build", post(build_handler))
        .fallback_service(frontend);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    eprintln!("wavemesh preview server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
