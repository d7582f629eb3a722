//! Initialize sources in a synthetic two-band blend
//!
//! Renders a noisy scene of Gaussian sources, builds each requested source
//! archetype at its catalogue position and logs what the initialization found.
//!
//! # Usage
//!
//! ```bash
//! # Default catalogue: one extended source and one point source
//! RUST_LOG=info cargo run --bin init_sources
//!
//! # Custom catalogue, bigger scene, different noise draw
//! RUST_LOG=debug cargo run --bin init_sources -- --catalogue sources.json --size 96 --seed 7
//! ```
//!
//! A catalogue is a JSON list of positions with a source configuration:
//!
//! ```json
//! [
//!   {"position": [20.0, 22.0], "type": "extended", "symmetric": true},
//!   {"position": [40.0, 40.0], "type": "multi_component", "flux_percentiles": [25, 60]}
//! ]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use deblend::source::{ExtendedConfig, PointConfig};
use deblend::synthetic::{render_scene, simple_normal_array, SyntheticSource};
use deblend::{Frame, GaussianPsf, Observation, SourceConfig};
use log::{error, info};
use ndarray::Array3;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON catalogue of source positions and configurations
    #[arg(short, long)]
    catalogue: Option<PathBuf>,

    /// Side of the square scene in pixels
    #[arg(long, default_value_t = 64)]
    size: usize,

    /// Standard deviation of the pixel noise
    #[arg(long, default_value_t = 0.05)]
    noise: f64,

    /// Seed of the noise draw
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// PSF width in pixels, per band
    #[arg(long, num_args = 1.., default_values_t = [1.0, 1.3])]
    psf_sigma: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct CatalogueEntry {
    position: (f64, f64),
    #[serde(flatten)]
    config: SourceConfig,
}

fn default_catalogue(size: usize) -> Vec<CatalogueEntry> {
    let scale = size as f64 / 64.0;
    vec![
        CatalogueEntry {
            position: (20.0 * scale, 22.0 * scale),
            config: SourceConfig::Extended(ExtendedConfig {
                symmetric: true,
                ..Default::default()
            }),
        },
        CatalogueEntry {
            position: (40.0 * scale, 40.0 * scale),
            config: SourceConfig::Point(PointConfig {}),
        },
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let catalogue: Vec<CatalogueEntry> = match &args.catalogue {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => default_catalogue(args.size),
    };

    let psf = GaussianPsf::with_auto_size(args.psf_sigma.clone())?;
    let channels = args.psf_sigma.len();
    let frame = Frame::new((channels, args.size, args.size)).with_psf(Arc::new(psf));

    // Every catalogue entry gets a Gaussian blob with a red or blue SED
    let truth: Vec<SyntheticSource> = catalogue
        .iter()
        .enumerate()
        .map(|(k, entry)| SyntheticSource {
            center: entry.position,
            sigma: if k % 2 == 0 { 2.5 } else { 1.2 },
            sed: (0..channels)
                .map(|c| if k % 2 == 0 { 4.0 - c as f64 } else { 1.0 + 2.0 * c as f64 })
                .collect(),
        })
        .collect();

    let shape = (channels, args.size, args.size);
    let mut images = render_scene(channels, (args.size, args.size), &truth)?;
    let weights = if args.noise > 0.0 {
        images += &simple_normal_array(shape, 0.0, args.noise, args.seed)?;
        Array3::from_elem(shape, 1.0 / (args.noise * args.noise))
    } else {
        Array3::ones(shape)
    };
    let observation = Observation::new(images, frame.clone())?.with_weights(weights)?;
    let observations = [observation];

    info!(
        "Scene {}x{} with {channels} bands, noise {:.3}, {} sources",
        args.size,
        args.size,
        args.noise,
        catalogue.len()
    );

    for (k, entry) in catalogue.iter().enumerate() {
        match entry.config.build(&frame, entry.position, &observations) {
            Ok(source) => {
                let total = source.render()?.sum();
                info!(
                    "Source {k} ({}) at {:?}: box {:?}..{:?}, {} parameters, total flux {total:.3}",
                    source.kind(),
                    entry.position,
                    source.bbox().start,
                    source.bbox().stop,
                    source.parameters().len(),
                );
                for parameter in source.parameters() {
                    info!("  {} {:?}", parameter.name, parameter.shape());
                }
            }
            Err(e) => error!("Source {k} at {:?} failed: {e}", entry.position),
        }
    }

    Ok(())
}
