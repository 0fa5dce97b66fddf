use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use memorybook_core::ingest::{self, PendingFace};
use memorybook_core::{
    Annotator, BookStore, Config, DetectionModel, FaceDecision, HistoryDir, IngestSettings,
    MemoryBook, OnnxFaceEncoder,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memorybook", about = "Memory Book: remember the faces in family photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in a photo, review their names and add new ones
    Add {
        /// JPEG or PNG photo
        photo: PathBuf,
        /// Detection model: fast or accurate
        #[arg(short, long)]
        model: Option<DetectionModel>,
        /// Scale factor applied before detection (0.25 to 1.0)
        #[arg(short, long)]
        resize: Option<f64>,
        /// Also write the annotated JPEG here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List everyone in the memory book
    List,
    /// Change the name of a memory book entry
    Rename {
        /// Entry index as shown by `list`
        index: usize,
        name: String,
    },
    /// Delete a memory book entry
    Delete {
        /// Entry index as shown by `list`
        index: usize,
    },
    /// List annotated photos, newest name first
    History,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let store = BookStore::new(&config.book_path);

    match cli.command {
        Commands::Add {
            photo,
            model,
            resize,
            output,
        } => {
            let defaults = config.default_ingest_settings();
            let settings = IngestSettings {
                model: model.unwrap_or(defaults.model),
                resize_factor: resize.unwrap_or(defaults.resize_factor),
            };
            settings.validate()?;

            let bytes = std::fs::read(&photo)
                .with_context(|| format!("failed to read {}", photo.display()))?;
            let mut encoder = OnnxFaceEncoder::load(
                &config.detector_model_path(),
                &config.recognizer_model_path(),
            )?;
            let policy = config.match_policy();
            let mut book = store.load()?;

            let pending = ingest::prepare(&bytes, settings, &mut encoder, &book, &policy)?;
            println!(
                "Detected {} face(s) using {} model.",
                pending.faces.len(),
                settings.model
            );

            let decisions = {
                let stdin = io::stdin();
                let mut input = stdin.lock();
                let mut out = io::stdout().lock();
                review_faces(&pending.faces, &mut input, &mut out)?
            };

            let history = HistoryDir::open(&config.history_dir)?;
            let annotator = Annotator::new(Some(config.font_path.as_path()));
            let report = ingest::finalize(
                &pending,
                &decisions,
                &mut book,
                &store,
                &history,
                &annotator,
                &policy,
            )?;

            for name in &report.added {
                println!("Added '{name}' to Memory Book.");
            }
            for name in &report.duplicates {
                println!("'{name}' already exists in Memory Book.");
            }
            println!("Annotated photo saved to {}", report.history_file.display());

            if let Some(output) = output {
                std::fs::write(&output, &report.annotated_jpeg)
                    .with_context(|| format!("failed to write {}", output.display()))?;
                println!("Annotated photo written to {}", output.display());
            }
        }
        Commands::List => {
            let book = store.load()?;
            print!("{}", format_book(&book));
        }
        Commands::Rename { index, name } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("name cannot be empty");
            }
            let mut book = store.load()?;
            if book.rename(index, name)? {
                store.save(&book)?;
                tracing::info!(index, name, "memory book entry renamed");
                println!("Updated name to '{name}'");
            } else {
                println!("Name unchanged.");
            }
        }
        Commands::Delete { index } => {
            let mut book = store.load()?;
            let removed = book.remove(index)?;
            store.save(&book)?;
            tracing::info!(index, name = %removed.name, "memory book entry deleted");
            println!("Deleted '{}'", removed.name);
        }
        Commands::History => {
            let history = HistoryDir::open(&config.history_dir)?;
            let names = history.list()?;
            if names.is_empty() {
                println!("No historical photos yet.");
            }
            for name in names {
                println!("{}", history.path().join(name).display());
            }
        }
    }

    Ok(())
}

/// Ask about every detected face. End of input counts as no answer.
fn review_faces<R: BufRead, W: Write>(
    faces: &[PendingFace],
    input: &mut R,
    out: &mut W,
) -> io::Result<Vec<FaceDecision>> {
    let mut decisions = Vec::with_capacity(faces.len());

    for (i, face) in faces.iter().enumerate() {
        writeln!(
            out,
            "Face {}: detected name {}",
            i + 1,
            face.identification.name
        )?;

        let mut decision = FaceDecision {
            marked_wrong: prompt(input, out, "Is this incorrect? [y/N] ")?
                .to_ascii_lowercase()
                .starts_with('y'),
            corrected_name: None,
        };
        if face.needs_name(&decision) {
            let name = prompt(input, out, "Enter correct name (blank to skip): ")?;
            decision.corrected_name = Some(name).filter(|n| !n.is_empty());
        }
        decisions.push(decision);
    }

    Ok(decisions)
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> io::Result<String> {
    write!(out, "{question}")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn format_book(book: &MemoryBook) -> String {
    if book.is_empty() {
        return "Memory Book is empty.\n".to_string();
    }
    book.records()
        .iter()
        .enumerate()
        .map(|(idx, record)| format!("[{idx}] {} (added {})\n", record.name, record.timestamp))
        .collect()
}
