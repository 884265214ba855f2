use clap::Parser as ClapParser;
use logchain::{Config, EventFactory, FieldValue, Filter, Level, Record, Sink, WriterSink};
use std::{fs, io, path::PathBuf};
use tracing::error;

/// logchain filter pipeline example
#[derive(Debug, clap::Parser)]
struct Opts {
    /// Optional yaml configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Drop events below this level
    #[arg(long)]
    pub level_min: Option<Level>,

    /// Drop events above this level
    #[arg(long)]
    pub level_max: Option<Level>,

    /// Suppress consecutive duplicate messages
    #[arg(long)]
    pub dedup: bool,

    /// Capture the caller's stack for each event
    #[arg(long)]
    pub stack: bool,
}

fn main() {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();

    let mut cfg: Config = match opts.config.as_ref() {
        Some(path) => {
            let cfg_str = fs::read_to_string(path).unwrap();
            serde_yaml::from_str(&cfg_str).unwrap()
        }
        None => Config::default(),
    };
    if opts.level_min.is_some() {
        cfg.filter.level_min = opts.level_min;
    }
    if opts.level_max.is_some() {
        cfg.filter.level_max = opts.level_max;
    }
    cfg.filter.dedup |= opts.dedup;

    let factory = EventFactory::new(&cfg);
    let chain = Filter::from_config(WriterSink::new(io::stdout()), &cfg.filter);

    let request = Record::new("Request")
        .field("method", "GET")
        .field("path", "/health")
        .field("headers", FieldValue::sequence(["accept: */*", "host: localhost"]));

    let events = [
        (Level::Debug, "connection accepted"),
        (Level::Info, "request received"),
        (Level::Warning, "upstream slow"),
        (Level::Warning, "upstream slow"),
        (Level::Warning, "upstream slow"),
        (Level::Error, "upstream timed out"),
    ];

    for (id, (level, message)) in events.into_iter().enumerate() {
        let e = factory.new_event(id as u64, level, message, request.clone(), opts.stack);
        if let Err(e) = chain.event(&e) {
            error!("{e}");
            break;
        }
    }
}
