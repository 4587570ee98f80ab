use std::error::Error;

use sppm::{SceneData, SppmConfig, SppmRenderer};

/// Render the built-in box scene for a number of progressive frames and
/// write the tone-mapped result as a PNG.
///
/// Usage: sppm_demo [frames] [output.png]
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let frames: u32 = match args.next() {
        Some(v) => v.parse()?,
        None => 64,
    };
    let output = args.next().unwrap_or_else(|| "sppm_demo.png".to_string());

    let width = 512;
    let height = 512;
    let mut renderer = SppmRenderer::new(width, height, SppmConfig::default())?;
    renderer.bind_scene(SceneData::cornell_box())?;

    for _ in 0..frames {
        let report = renderer.render_frame()?;
        if report.frame_index % 16 == 0 {
            log::info!(
                "frame {:4}  radii {:.5} / {:.5}  yield {} / {}",
                report.frame_index,
                report.radii[sppm::PhotonClass::Caustic],
                report.radii[sppm::PhotonClass::Global],
                report.yields[sppm::PhotonClass::Caustic],
                report.yields[sppm::PhotonClass::Global]
            );
        }
    }

    let pixels = renderer.read_output()?;
    let mut rgba = Vec::with_capacity(pixels.len());
    for px in pixels.chunks_exact(4) {
        for c in 0..3 {
            // Reinhard plus gamma 2.2, enough for a preview image.
            let v = px[c].max(0.0);
            let mapped = (v / (1.0 + v)).powf(1.0 / 2.2);
            rgba.push((mapped * 255.0 + 0.5) as u8);
        }
        rgba.push(255);
    }
    image::RgbaImage::from_raw(width, height, rgba)
        .ok_or("pixel buffer size mismatch")?
        .save(&output)?;
    println!("wrote {output} after {frames} frames");
    Ok(())
}
