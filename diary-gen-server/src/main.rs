use std::path::{Path, PathBuf};

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, middleware, route, web};
use clap::Parser;
use log::info;
use rand::seq::{IndexedRandom, index};
use serde::Deserialize;
use serde_json::json;

use diary_gen_core::batch::source::{BatchTextResponse, SingleTextResponse, SourceStats, TextRecord};
use diary_gen_core::io::{list_corpus_files, read_corpus};
use diary_gen_core::{MarkovError, MarkovModel, SentenceGenerator};

/// Default number of records per batch request
const DEFAULT_COUNT: usize = 20;
/// Upper bound on records per batch request
const MAX_COUNT: usize = 50;

/// Local corpus source for the diary text generator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// Folder holding the `.txt` corpus files (one record per non-blank line)
	#[arg(long, default_value = "./data")]
	data: PathBuf,

	#[arg(long, default_value = "127.0.0.1")]
	host: String,

	#[arg(long, default_value_t = 5000)]
	port: u16,

	/// Order of the model behind `/api/generate`
	#[arg(long, default_value_t = 5)]
	order: usize,
}

/// Query parameters of the batch endpoints
#[derive(Deserialize)]
struct CountQuery {
	count: Option<usize>,
}

impl CountQuery {
	/// Requested count, defaulted and clamped to `1..=MAX_COUNT`.
	fn count(&self) -> usize {
		self.count.unwrap_or(DEFAULT_COUNT).clamp(1, MAX_COUNT)
	}
}

/// Corpus and model, read-only once the server runs.
struct SharedData {
	texts: Vec<String>,
	model: MarkovModel,
	generator: SentenceGenerator,
}

impl SharedData {
	fn new(texts: Vec<String>, order: usize) -> Result<Self, MarkovError> {
		let model = MarkovModel::build_parallel(&texts, order)?;
		Ok(Self { texts, model, generator: SentenceGenerator::default() })
	}

	fn stats(&self, returned: usize) -> SourceStats {
		SourceStats { total_texts: self.texts.len(), returned }
	}
}

fn not_found(message: &str) -> HttpResponse {
	HttpResponse::NotFound().json(json!({ "error": message }))
}

/// Reads every `.txt` file of `folder`, in name order.
fn load_corpus(folder: &Path) -> std::io::Result<Vec<String>> {
	let mut texts = Vec::new();
	for file in list_corpus_files(folder, "txt")? {
		let lines = read_corpus(&file)?;
		info!("{}: {} records", file.display(), lines.len());
		texts.extend(lines);
	}
	Ok(texts)
}

/// HTTP GET endpoint `/api/random-text`
///
/// Returns one random corpus record.
#[get("/api/random-text")]
async fn get_random_text(data: web::Data<SharedData>) -> impl Responder {
	match data.texts.choose(&mut rand::rng()) {
		Some(text) => HttpResponse::Ok().json(SingleTextResponse { text: text.clone(), stats: data.stats(1) }),
		None => not_found("corpus is empty"),
	}
}

/// HTTP GET/HEAD endpoint `/api/random-texts?count=N`
///
/// Returns up to `count` distinct records in random order. HEAD doubles as
/// the client's reachability check.
#[route("/api/random-texts", method = "GET", method = "HEAD")]
async fn get_random_texts(data: web::Data<SharedData>, query: web::Query<CountQuery>) -> impl Responder {
	let amount = query.count().min(data.texts.len());
	let texts: Vec<TextRecord> = index::sample(&mut rand::rng(), data.texts.len(), amount)
		.into_iter()
		.map(|id| TextRecord { id, text: data.texts[id].clone() })
		.collect();

	let stats = data.stats(texts.len());
	HttpResponse::Ok().json(BatchTextResponse { texts, stats })
}

/// HTTP GET endpoint `/api/generate?count=N`
///
/// Generates lines from the model built over the whole corpus.
#[get("/api/generate")]
async fn get_generated(data: web::Data<SharedData>, query: web::Query<CountQuery>) -> impl Responder {
	match data.generator.generate_many(&data.model, query.count(), &mut rand::rng()) {
		Ok(lines) => {
			let texts: Vec<TextRecord> = lines
				.into_iter()
				.enumerate()
				.map(|(id, text)| TextRecord { id, text })
				.collect();
			let stats = data.stats(texts.len());
			HttpResponse::Ok().json(BatchTextResponse { texts, stats })
		}
		Err(MarkovError::EmptyModel) => not_found("model is empty"),
		Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
	}
}

#[get("/api/health")]
async fn get_health(data: web::Data<SharedData>) -> impl Responder {
	HttpResponse::Ok().json(json!({ "status": "ok", "total_texts": data.texts.len() }))
}

fn configure(cfg: &mut web::ServiceConfig) {
	cfg.service(get_random_text)
		.service(get_random_texts)
		.service(get_generated)
		.service(get_health);
}

/// Main entry point for the server.
///
/// Loads the corpus folder, builds the generation model once and serves the
/// corpus endpoints until interrupted.
#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let args = Args::parse();

	let texts = load_corpus(&args.data)?;
	let shared_data = SharedData::new(texts, args.order)?;
	info!(
		"serving {} records (order-{} model: {} keys, {} beginnings) on {}:{}",
		shared_data.texts.len(),
		args.order,
		shared_data.model.len(),
		shared_data.model.beginnings().len(),
		args.host,
		args.port
	);
	let shared_data = web::Data::new(shared_data);

	HttpServer::new(move || {
		let cors = Cors::default()
			.allow_any_origin()
			.allowed_methods(vec!["GET", "HEAD"]);
		App::new()
			.wrap(middleware::Logger::default())
			.wrap(cors)
			.app_data(shared_data.clone())
			.configure(configure)
	})
		.bind((args.host.as_str(), args.port))?
		.run()
		.await?;

	Ok(())
}
