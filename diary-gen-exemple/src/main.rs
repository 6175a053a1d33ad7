use std::io::Write;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use diary_gen_core::{
    GenerationQueue, HttpTextSource, MarkovError, MarkovModel, QueueConfig, SentenceGenerator, SourceConfig,
    TextSource,
};

/// Refills in a row that may bring no new line before giving up
const MAX_FRUITLESS_REFILLS: usize = 3;

/// Types out generated diary lines, the way the blog page does.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base URL of the corpus source
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    url: String,

    /// Corpus lines fetched (and candidates generated) per refill
    #[arg(long, default_value_t = 20)]
    batch_size: usize,

    /// Lines shown before the session ends
    #[arg(long, default_value_t = 20)]
    session_cap: usize,

    /// Shortest line worth showing, in characters
    #[arg(long, default_value_t = 20)]
    min_chars: usize,

    /// N-gram length
    #[arg(long, default_value_t = 5)]
    order: usize,

    /// Delay between typed characters
    #[arg(long, default_value_t = 30)]
    delay_ms: u64,

    /// Fixed rng seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Generate offline from a local corpus file instead of the server
    #[arg(long)]
    file: Option<std::path::PathBuf>,
}

impl Args {
    fn queue_config(&self) -> Result<QueueConfig, MarkovError> {
        let mut config = QueueConfig::default();
        config.set_order(self.order)?;
        config.set_batch_size(self.batch_size)?;
        config.set_session_cap(self.session_cap)?;
        config.min_chars = self.min_chars;
        Ok(config)
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

/// Prints `line` one character at a time, then a newline.
async fn typewrite(line: &str, delay: Duration) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    for c in line.chars() {
        write!(stdout, "{c}")?;
        stdout.flush()?;
        tokio::time::sleep(delay).await;
    }
    writeln!(stdout)?;
    Ok(())
}

/// Pulls lines from the queue until the session is over.
///
/// Returns the number of lines shown.
async fn run_session<S: TextSource>(queue: &GenerationQueue<S>, delay: Duration) -> std::io::Result<usize> {
    let mut shown = 0;
    let mut fruitless_refills = 0;

    loop {
        if let Some(line) = queue.get_next_text() {
            typewrite(&line, delay).await?;
            shown += 1;
            fruitless_refills = 0;
            continue;
        }

        if !queue.has_more_texts() {
            break;
        }
        if fruitless_refills >= MAX_FRUITLESS_REFILLS {
            warn!("no new lines after {fruitless_refills} refills, stopping");
            break;
        }

        // A failed refill only ends the show; nothing is retried here
        if let Err(e) = queue.load_text_batch(0).await {
            error!("refill failed: {e}");
            break;
        }
        fruitless_refills += 1;
    }

    Ok(shown)
}

/// Builds (or loads the cached) model of `file` and prints one batch.
fn run_offline(file: &Path, config: &QueueConfig, rng: &mut StdRng) -> Result<(), MarkovError> {
    let model = MarkovModel::load_or_build(file, config.order)?;
    let generator = SentenceGenerator::new(config.max_tokens);

    let lines = match generator.generate_many(&model, config.batch_size, rng) {
        Ok(lines) => lines,
        Err(MarkovError::EmptyModel) => {
            warn!("{}: no line has more than {} words", file.display(), config.order);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for line in lines.iter().filter(|l| l.chars().count() >= config.min_chars) {
        println!("{line}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = args.queue_config()?;

    if let Some(file) = &args.file {
        run_offline(file, &config, &mut args.rng())?;
        return Ok(());
    }

    let source = HttpTextSource::new(SourceConfig::new(&args.url))?;
    let queue = GenerationQueue::with_rng(source, config, args.rng())?;

    // Nothing to show is fine; only a crash is not
    if !queue.is_available().await {
        warn!("corpus source {} is not available, nothing to show", args.url);
        return Ok(());
    }
    if let Err(e) = queue.load_text_batch(0).await {
        error!("first batch failed: {e}");
        return Ok(());
    }

    let shown = run_session(&queue, Duration::from_millis(args.delay_ms)).await?;
    info!("session over after {shown} lines ({} corpus lines fetched)", queue.corpus_len());
    Ok(())
}
