use anyhow::Result;
use clap::Parser;
use mpisonar::cli::{Cli, OutputFormat};
use mpisonar::summary::TimelineSummary;
use mpisonar::synth::{self, SynthConfig};
use mpisonar::timeline::Timeline;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let timeline = Timeline::load(&args.dir, args.time_scale)?;
    if timeline.num_ranks() == 0 {
        anyhow::bail!(
            "no rank_<N>_output.t logs found in '{}'",
            args.dir.display()
        );
    }
    eprintln!(
        "[mpisonar: found {} rank logs in '{}']",
        timeline.num_ranks(),
        args.dir.display()
    );

    if args.summary {
        let summary = TimelineSummary::from_timeline(&timeline);
        match args.format {
            OutputFormat::Text => print!("{}", summary.to_text()),
            OutputFormat::Json => println!("{}", summary.to_json()?),
        }
        return Ok(());
    }

    let config = SynthConfig {
        sample_rate: args.sample_rate,
        ..SynthConfig::default()
    };
    synth::render_to_file(&timeline, args.left, args.right, &config, &args.output)?;

    eprintln!(
        "[mpisonar: wrote {:.3} s of audio to '{}' (ranks {} | {})]",
        timeline.max_time(),
        args.output.display(),
        args.left,
        args.right
    );

    Ok(())
}
