use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use learnloop::config::{resolve_config_source, Config};
use learnloop::context::{build_ask_context_turns, AskContextRequest};
use learnloop::conversation::{build_reading_conversation, ReadingRequest};
use learnloop::error::LearnloopError;
use learnloop::models::JsonOutput;
use learnloop::profile::{
    aggregate_signals, build_learning_profile_with, calc_coverage, choose_targets,
    derive_flashcard_stats,
};
use learnloop::queue::{build_review_queue, QueueRequest};
use learnloop::sm2::{schedule_review, Grade, MAX_QUALITY};
use learnloop::snapshot::{
    load_json, HistorySnapshot, ProfileSnapshot, QueueSnapshot, ReviewLog, RowsFile,
};
use learnloop::timestamp::parse_timestamp;

const LOG_ENV: &str = "LEARNLOOP_LOG";

#[derive(Parser)]
#[command(name = "learnloop")]
#[command(about = "Spaced-repetition scheduling and study context for English learners")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to $LEARNLOOP_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a card against its review log and print the new record
    Grade {
        /// Review log JSON file (`-` for stdin)
        log: PathBuf,

        /// Card ID
        #[arg(long, short)]
        card: String,

        /// remembered/forgot or a quality from 0 to 5
        #[arg(long, short)]
        grade: String,

        /// Review time (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Show cards due for review
    Queue {
        /// Snapshot JSON with cards and reviews
        snapshot: PathBuf,

        /// Evaluate due-ness at this time (defaults to now)
        #[arg(long)]
        now: Option<String>,

        /// Maximum cards to queue
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Assemble the ask-mode context for a new message
    Context {
        /// Prior dialogue rows JSON file
        rows: PathBuf,

        /// The learner's new message
        #[arg(long, short)]
        message: String,
    },

    /// Merge chat and flashcard history into a reading conversation
    Reading {
        /// History JSON with chat messages, flashcards and reviews
        history: PathBuf,

        /// Character budget (overrides config)
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Build the learning profile and pick generation targets
    Profile {
        /// Snapshot JSON with cards, reviews and signals
        snapshot: PathBuf,

        /// Reference day (defaults to now)
        #[arg(long)]
        today: Option<String>,
    },

    /// Score how well a passage covers its targets
    Coverage {
        /// Comma-separated required targets
        #[arg(long, short)]
        required: String,

        /// Comma-separated targets the passage used
        #[arg(long, short)]
        used: String,

        /// The generated passage
        #[arg(long)]
        passage: Option<String>,

        /// The previous passage, for repetition checks
        #[arg(long)]
        previous: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let source = resolve_config_source(cli.config.as_deref());
    let config = Config::load(&source)?;

    match cli.command {
        Commands::Grade {
            log,
            card,
            grade,
            at,
        } => {
            let quality = parse_grade(&grade)?;
            let reviewed_at = parse_instant(at.as_deref())?;
            let log: ReviewLog = load_json(&log)?;

            let record = schedule_review(&card, log.latest_for(&card), quality, reviewed_at);

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&record))?);
            } else {
                match Grade::from_str(&grade) {
                    Some(named) => println!(
                        "Graded card {} as {} (quality {}).",
                        record.card_id,
                        named.as_str(),
                        record.quality
                    ),
                    None => println!(
                        "Graded card {} with quality {}.",
                        record.card_id, record.quality
                    ),
                }
                println!(
                    "Repetition: {}  Interval: {} day(s)  Ease: {:.2}",
                    record.repetition, record.interval_days, record.ease_factor
                );
                println!("Next review: {}", record.next_review_at.to_rfc3339());
            }
        }

        Commands::Queue {
            snapshot,
            now,
            limit,
        } => {
            let now = parse_instant(now.as_deref())?;
            let snapshot: QueueSnapshot = load_json(&snapshot)?;
            let max_queue = limit.unwrap_or(config.queue.max_queue);

            let queue = build_review_queue(
                &QueueRequest::new(&snapshot.cards, &snapshot.reviews, now)
                    .with_max_queue(max_queue),
            );

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&queue))?);
            } else if queue.queue.is_empty() {
                println!("Nothing due.");
                if let Some(next) = queue.next_due_at {
                    println!("Next card due: {}", next.to_rfc3339());
                }
            } else {
                println!(
                    "{} due ({} new, {} overdue)",
                    queue.total,
                    queue.new_count(),
                    queue.overdue_count()
                );
                println!("{:<12} {:<40} NEXT REVIEW", "CARD", "FRONT");
                println!("{}", "-".repeat(75));
                for item in &queue.queue {
                    let next = item
                        .next_review_at
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| String::from("new"));
                    println!(
                        "{:<12} {:<40} {}",
                        truncate(&item.card_id, 12),
                        truncate(&item.front, 38),
                        next
                    );
                }
                if let Some(next) = queue.next_due_at {
                    println!();
                    println!("Next card due after these: {}", next.to_rfc3339());
                }
            }
        }

        Commands::Context { rows, message } => {
            let rows = load_json::<RowsFile>(&rows)?.into_rows();
            let mut request = AskContextRequest::new(&rows, &message);
            request.max_history_turns = config.context.max_history_turns;
            request.max_total_chars = config.context.max_total_chars;

            let turns = build_ask_context_turns(&request);

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&turns))?);
            } else {
                for turn in &turns {
                    println!("[{}] {}", turn.speaker.api_role(), turn.text);
                }
            }
        }

        Commands::Reading { history, max_chars } => {
            let history: HistorySnapshot = load_json(&history)?;
            let mut request = ReadingRequest::new(
                &history.chat_messages,
                &history.flashcards,
                &history.flashcard_reviews,
            );
            request.max_chars = max_chars.unwrap_or(config.reading.max_chars);
            request.translate_prompt = &config.reading.translate_prompt;

            let reading = build_reading_conversation(&request);

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&reading))?);
            } else {
                for turn in &reading.turns {
                    println!("[{}] {}", turn.speaker.as_str(), turn.text);
                }
                println!();
                println!("=== Reading Context ===");
                println!(
                    "Events: {} ({} dialogue, {} translation, {} flashcard)",
                    reading.stats.total_events,
                    reading.stats.dialogue_count,
                    reading.stats.translation_pair_count,
                    reading.stats.flashcard_pair_count
                );
                println!(
                    "Characters: {} ({} events trimmed)",
                    reading.stats.context_chars, reading.stats.trimmed_count
                );
                println!("Review targets: {}", join_or_dash(&reading.used_review_targets));
                println!("New targets: {}", join_or_dash(&reading.used_new_targets));
            }
        }

        Commands::Profile { snapshot, today } => {
            let today = parse_instant(today.as_deref())?;
            let snapshot: ProfileSnapshot = load_json(&snapshot)?;

            let limits = &config.profile;
            let stats = derive_flashcard_stats(&snapshot.cards, &snapshot.reviews, today, limits);
            let signals = aggregate_signals(&snapshot.signals);
            let profile = build_learning_profile_with(&stats, &signals, today, limits);
            let chosen = choose_targets(&profile);

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "profile": profile,
                        "chosen": chosen
                    })))?
                );
            } else {
                println!("=== Learning Profile ===");
                println!("Review targets: {}", join_or_dash(&profile.review_targets));
                println!("Grammar targets: {}", join_or_dash(&profile.grammar_targets));
                println!("New candidates: {}", join_or_dash(&profile.new_candidates));
                println!();
                println!("Chosen review: {}", join_or_dash(&chosen.review));
                println!("Chosen fresh: {}", join_or_dash(&chosen.fresh));
            }
        }

        Commands::Coverage {
            required,
            used,
            passage,
            previous,
        } => {
            let required = split_list(&required);
            let used = split_list(&used);

            let gate = &config.generation;
            let verdict = passage.as_deref().map(|passage| {
                gate.evaluate(&required[..], &used[..], previous.as_deref(), passage)
            });
            let coverage =
                verdict.map_or_else(|| calc_coverage(&required[..], &used[..]), |v| v.coverage);

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "coverage": coverage,
                        "verdict": verdict
                    })))?
                );
            } else {
                println!("Coverage: {:.0}%", coverage * 100.0);
                if let Some(v) = verdict {
                    println!("Similarity to previous: {:.2}", v.similarity);
                    println!("Accepted: {}", if v.accepted { "yes" } else { "no" });
                }
            }
        }

        Commands::Config => {
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&config))?);
            } else {
                if let Some(path) = source.path() {
                    println!("# loaded from {}", path.display());
                }
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

fn parse_grade(raw: &str) -> Result<i32, LearnloopError> {
    if let Some(grade) = Grade::from_str(raw) {
        return Ok(grade.quality());
    }
    match raw.trim().parse::<i32>() {
        Ok(quality) if (0..=MAX_QUALITY).contains(&quality) => Ok(quality),
        _ => Err(LearnloopError::InvalidGrade(raw.to_string())),
    }
}

fn parse_instant(raw: Option<&str>) -> Result<DateTime<Utc>, LearnloopError> {
    match raw {
        None => Ok(Utc::now()),
        Some(value) => parse_timestamp(value)
            .ok_or_else(|| LearnloopError::InvalidTimestamp(value.to_string())),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        String::from("-")
    } else {
        items.join(", ")
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
