//! Eyewear pose demo: drives the engine with a synthetic, jittery face.

use anyhow::Result;
use clap::Parser;
use eyewear_pose::{
    config::Config,
    filters::AlgorithmKind,
    landmarks::LandmarkFrame,
    pose_estimation::HeadPose,
    FrameStatus, GlassesMappingEngine,
};
use log::{info, warn};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Smoothing algorithm (basic, kalman, adaptive, hybrid)
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Number of frames to simulate
    #[arg(short, long, default_value = "300")]
    frames: usize,

    /// Simulated camera frame rate
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Landmark jitter amplitude (uniform, per axis)
    #[arg(short, long, default_value = "1.5")]
    noise: f64,

    /// Drop every Nth frame (0 to disable)
    #[arg(long, default_value = "0")]
    dropout_every: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,
}

/// Slow head sway around a point half a metre in front of the camera
fn simulated_pose(t: f64) -> HeadPose {
    HeadPose {
        position: Point3::new(25.0 * (0.7 * t).sin(), 10.0 * (0.4 * t).sin(), -500.0 + 40.0 * (0.25 * t).sin()),
        rotation: UnitQuaternion::from_euler_angles(
            (4.0 * (0.5 * t).sin()).to_radians(),
            (8.0 * (0.3 * t).sin()).to_radians(),
            (20.0 * (0.6 * t).sin()).to_radians(),
        ),
        scale: 1.0,
    }
}

fn jittered(frame: &LandmarkFrame, amplitude: f64, rng: &mut StdRng) -> LandmarkFrame {
    if amplitude <= 0.0 {
        return frame.clone();
    }
    let points = frame
        .points()
        .iter()
        .map(|p| {
            p + Vector3::new(
                rng.gen_range(-amplitude..=amplitude),
                rng.gen_range(-amplitude..=amplitude),
                rng.gen_range(-amplitude..=amplitude),
            )
        })
        .collect();
    LandmarkFrame::new(points, frame.confidence())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Eyewear pose demo");

    // Load configuration if provided
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path);
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to load config file: {}. Using defaults.", e);
                Config::default()
            }
        }
    } else {
        Config::default()
    };
    if let Some(name) = &args.algorithm {
        config.positioning.algorithm = name.parse::<AlgorithmKind>()?;
    }
    anyhow::ensure!(args.fps > 0.0, "fps must be positive");

    anyhow::ensure!(args.noise.is_finite(), "noise must be finite");
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut engine = GlassesMappingEngine::new(config)?;
    info!("Using {} smoothing", engine.algorithm());

    let mut rejected = 0usize;
    let mut held = 0usize;
    let mut error_sum = 0.0;
    let mut error_count = 0usize;

    for i in 0..args.frames {
        let t = i as f64 / args.fps;
        let truth = simulated_pose(t);
        let dropped = args.dropout_every > 0 && i % args.dropout_every == args.dropout_every - 1;

        let frame = (!dropped).then(|| {
            let confidence = rng.gen_range(0.6..1.0);
            jittered(&LandmarkFrame::from_model(&truth, confidence), args.noise, &mut rng)
        });
        let report = engine.update(t, frame.as_ref());

        match &report.status {
            FrameStatus::Accepted => {}
            FrameStatus::OutlierRejected => rejected += 1,
            FrameStatus::Held(_) => held += 1,
        }
        if let Some(output) = &report.output {
            error_sum += nalgebra::distance(&output.position.position, &truth.position);
            error_count += 1;

            if i % (args.fps.round().max(1.0) as usize) == 0 {
                let q = &output.quality;
                info!(
                    "t={:6.2}s state={:<10} pos=({:7.2}, {:7.2}, {:8.2}) quality={:.2} [stab {:.2} acc {:.2} smooth {:.2} resp {:.2}]",
                    t,
                    report.state.to_string(),
                    output.position.position.x,
                    output.position.position.y,
                    output.position.position.z,
                    q.overall,
                    q.stability,
                    q.accuracy,
                    q.smoothness,
                    q.responsiveness,
                );
            }
        }
    }

    let mean_error = if error_count > 0 { error_sum / error_count as f64 } else { 0.0 };
    println!("Frames: {}", args.frames);
    println!("Held: {held}, outliers rejected: {rejected}");
    println!("Mean position error: {mean_error:.3}");
    println!("Final state: {}", engine.state());

    Ok(())
}
