use std::path::PathBuf;

use wavemesh::config::Params;
use wavemesh::{render, scenarios, WaveSource};

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .ok();

    let args: Vec<String> = std::env::args().collect();

    let scenario = args.get(1).map(String::as_str).unwrap_or("island");
    let wavelength: f32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(30.0);
    let direction_deg: f32 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let out_dir: PathBuf = args
        .get(4)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("artifacts"));

    let Some(terrain) = scenarios::by_name(scenario) else {
        eprintln!("unknown scenario '{scenario}' (open-ocean, island, shelves, beach)");
        std::process::exit(1);
    };

    std::fs::create_dir_all(&out_dir).expect("failed to create output directory");

    let source = WaveSource {
        amplitude: 1.0,
        wavelength,
        direction: direction_deg.to_radians(),
        phase_offset: 0.0,
    };
    let params = Params::default();

    eprintln!(
        "Building '{}' mesh: wavelength={}ft direction={}deg",
        scenario, wavelength, direction_deg
    );

    let (mesh, stats) = match wavemesh::build_wave_mesh(&source, &terrain, 0.0, &params) {
        Ok(out) => out,
        Err(err) => {
            eprintln!("build failed: {err}");
            std::process::exit(1);
        }
    };

    // Print timings
    eprintln!("\nTimings:");
    for t in &stats.timings {
        eprintln!("  {:12} {:8.1} ms", t.name, t.ms);
    }
    eprintln!(
        "\nSteps {} | merges {} | splits {} | rows removed {}",
        stats.steps, stats.merges, stats.splits, stats.rows_removed
    );
    eprintln!(
        "Vertices {} -> {} | triangles {} -> {}",
        stats.vertices_before, stats.vertices_after, stats.triangles_before, stats.triangles_after
    );

    // Save diagnostic PNGs; resolution follows the quad aspect loosely.
    let (w, h) = (1024usize, 512usize);
    let save = |name: &str, rgba: &[u8]| {
        let path = out_dir.join(name);
        image::save_buffer(&path, rgba, w as u32, h as u32, image::ColorType::Rgba8)
            .expect("failed to save image");
        eprintln!("Saved {}", path.display());
    };

    save("amplitude.png", &render::render_amplitude(&mesh, w, h));
    save("breaking.png", &render::render_breaking(&mesh, w, h));
    save("blend.png", &render::render_blend(&mesh, w, h));
    save("depth.png", &render::render_depth(&terrain, &mesh, w, h));

    eprintln!("\nDone.");
}
