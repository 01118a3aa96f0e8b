use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utrace::cli::commands::{completions, equip, init, qc, step, track, unit, user};
use utrace::cli::{Cli, Commands};
use utrace::core::TraceError;

/// Environment variable holding a tracing filter directive
const LOG_ENV: &str = "UTRACE_LOG";

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    // Install miette's fancy error handler for beautiful diagnostics
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }));

    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let global = &cli.global;
    let result = match cli.command {
        Commands::Init(args) => init::run(args, global),
        Commands::User(cmd) => user::run(cmd, global),
        Commands::Unit(cmd) => unit::run(cmd, global),
        Commands::Equip(cmd) => equip::run(cmd, global),
        Commands::Track(cmd) => track::run(cmd, global),
        Commands::Step(cmd) => step::run(cmd, global),
        Commands::Qc(cmd) => qc::run(cmd, global),
        Commands::Completions(args) => completions::run(args),
    };

    if let Err(report) = result {
        eprintln!("{:?}", report);
        let code = report
            .downcast_ref::<TraceError>()
            .map(TraceError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
