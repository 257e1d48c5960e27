use anyhow::Context;
use chrono::{Duration, Local};
use clap::Parser;
use nginx_analyzer::logging::init_logging;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

const IPS: [(&str, u32); 8] = [
    ("192.168.1.100", 40),
    ("192.168.1.101", 35),
    ("192.168.1.102", 25),
    ("10.0.0.50", 20),
    ("10.0.0.51", 20),
    ("172.16.0.10", 10),
    ("172.16.0.11", 8),
    ("172.16.0.12", 5),
];

const METHODS: [(&str, u32); 4] = [("GET", 80), ("POST", 15), ("PUT", 3), ("DELETE", 2)];

// earlier paths are drawn more often
const PATHS: [&str; 25] = [
    "/", "/", "/", "/", "/about", "/about", "/contact", "/products", "/products",
    "/products/electronics", "/products/books", "/products/clothing", "/admin",
    "/api/v1/users", "/api/v1/users", "/api/v1/orders", "/api/v1/products", "/user/profile",
    "/search", "/search", "/cart", "/cart", "/checkout", "/blog/post/123", "/blog/post/456",
];

const STATUSES: [u16; 8] = [200, 200, 200, 200, 200, 304, 404, 500];

const REFERRERS: [&str; 5] = [
    "-",
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://example.com/",
    "https://socialmedia.com/post/123",
];

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
    "Googlebot/2.1 (+http://www.google.com/bot.html)",
    "curl/7.68.0",
];

/// Writes a synthetic combined-format access log for testing `nginx-an`.
#[derive(Parser, Debug)]
#[command(name = "gen-access-log", version)]
struct Args {
    /// Number of lines to generate
    #[arg(short, long, default_value_t = 10_000)]
    lines: u64,

    /// Output file
    #[arg(short, long, default_value = "access.log")]
    output: PathBuf,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct LineGen {
    rng: StdRng,
    ips: WeightedIndex<u32>,
    methods: WeightedIndex<u32>,
    paths: WeightedIndex<usize>,
}

impl LineGen {
    fn new(rng: StdRng) -> anyhow::Result<LineGen> {
        let len = PATHS.len();
        Ok(LineGen {
            rng,
            ips: WeightedIndex::new(IPS.iter().map(|(_, w)| *w))?,
            methods: WeightedIndex::new(METHODS.iter().map(|(_, w)| *w))?,
            paths: WeightedIndex::new((0..len).map(|i| len - i))?,
        })
    }

    fn write_line<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        let rng = &mut self.rng;
        let time = Local::now().fixed_offset() - Duration::seconds(rng.gen_range(0..86_400));

        writeln!(
            out,
            "{} - - {} \"{} {} HTTP/1.1\" {} {} \"{}\" \"{}\"",
            IPS[self.ips.sample(rng)].0,
            time.format("[%d/%b/%Y:%H:%M:%S %z]"),
            METHODS[self.methods.sample(rng)].0,
            PATHS[self.paths.sample(rng)],
            STATUSES.choose(rng).unwrap_or(&200),
            rng.gen_range(200..5200),
            REFERRERS.choose(rng).unwrap_or(&"-"),
            USER_AGENTS.choose(rng).unwrap_or(&"-"),
        )
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut lines = LineGen::new(rng)?;

    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);

    for i in 0..args.lines {
        lines.write_line(&mut out)?;
        if i % 100_000 == 0 {
            tracing::debug!(written = i, total = args.lines, "generating");
        }
    }
    out.flush()?;

    println!(
        "Successfully created a file {} with {} records",
        args.output.display(),
        args.lines
    );
    Ok(())
}
