use crate::config::Config;
use crate::eval::{Orchestrator, RunOptions, RunSummary, display_grade};
use crate::evidence::EvidenceStore;
use crate::provider::{AnthropicClient, ModelClient, RateLimiter};
use crate::skills::{SkillLibrary, SkillRecord};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `skillgrade` - blinded paired-comparison rating for AI assistant skills.
#[derive(Parser, Debug)]
#[command(name = "skillgrade")]
#[command(version = "0.1.0")]
#[command(about = "Rates assistant skills through blinded paired trials.", long_about = None)]
pub struct Cli {
    /// Path to a config file (default: ./skillgrade.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List skills available for evaluation
    List,

    /// Evaluate one skill or all discovered skills
    Evaluate {
        /// Evaluate a single skill by id
        #[arg(long, conflicts_with = "all")]
        skill: Option<String>,

        /// Evaluate every discovered skill
        #[arg(long)]
        all: bool,

        /// Invalidate cached prompts and trials, then regenerate
        #[arg(long)]
        force: bool,

        /// Skip the security analysis pass (recorded explicitly)
        #[arg(long)]
        skip_security: bool,

        /// Bound the number of skills evaluated
        #[arg(long)]
        limit: Option<usize>,

        /// Position-assignment seed (default: fresh random seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the current leaderboard
    Leaderboard,
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<ExitCode> {
    match cli.command {
        Commands::List => {
            list_skills(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Leaderboard => {
            print_leaderboard(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Evaluate {
            skill,
            all,
            force,
            skip_security,
            limit,
            seed,
        } => {
            if skill.is_none() && !all {
                anyhow::bail!("select a skill with --skill <id> or evaluate everything with --all");
            }
            let opts = RunOptions {
                force,
                skip_security,
                limit,
                seed,
            };
            evaluate(&config, skill, &opts).await
        }
    }
}

fn list_skills(config: &Config) {
    let library = SkillLibrary::new(
        &config.paths.skills_dir,
        config.trials.max_content_bytes,
    );
    let skills = library.list();
    if skills.is_empty() {
        println!(
            "No skills found in {}. Run discovery first.",
            config.paths.skills_dir.display()
        );
        return;
    }

    println!("Discovered skills ({} total):", skills.len());
    for id in skills {
        println!("  - {id}");
    }
}

fn print_leaderboard(config: &Config) {
    let store = EvidenceStore::new(&config.paths.evaluations_dir, &config.paths.leaderboard);
    let Some(board) = store.load_leaderboard() else {
        println!("No leaderboard found. Run some evaluations first.");
        return;
    };

    println!("Leaderboard (generated {})", board.generated_at.to_rfc3339());
    println!("{:<6} {:<25} {:<18} {:<10} {:<10}", "rank", "skill", "grade", "win rate", "security");
    for (rank, rating) in board.ratings.iter().enumerate() {
        let win_rate = rating
            .win_rate
            .map_or_else(|| "n/a".to_string(), |rate| format!("{rate:.1}%"));
        let security = rating
            .security_grade
            .map_or_else(|| "skipped".to_string(), |grade| grade.to_string());
        println!(
            "{:<6} {:<25} {:<18} {:<10} {:<10}",
            rank + 1,
            rating.skill_id,
            display_grade(rating.grade),
            win_rate,
            security
        );
    }
}

async fn evaluate(config: &Config, skill: Option<String>, opts: &RunOptions) -> Result<ExitCode> {
    let api_key = config.resolved_api_key()?;
    let client: Arc<dyn ModelClient> =
        Arc::new(AnthropicClient::new(api_key, config.request_timeout()));
    let limiter = Arc::new(RateLimiter::new(
        config.limits.max_in_flight,
        config.calls_per_minute(),
    ));
    let store = EvidenceStore::new(&config.paths.evaluations_dir, &config.paths.leaderboard);
    let library = SkillLibrary::new(&config.paths.skills_dir, config.trials.max_content_bytes);

    let ids = match skill {
        Some(id) => vec![id],
        None => library.list(),
    };
    if ids.is_empty() {
        anyhow::bail!("no skills found to evaluate");
    }

    let mut skills: Vec<SkillRecord> = Vec::new();
    let mut load_failures: Vec<(String, String)> = Vec::new();
    for id in ids {
        match library.load(&id) {
            Ok(record) => skills.push(record),
            Err(err) => {
                tracing::warn!(skill = id.as_str(), "cannot load skill: {err}");
                load_failures.push((id, err.to_string()));
            }
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight trials then stopping");
            ctrl_c_cancel.cancel();
        }
    });

    let orchestrator = Orchestrator::new(client, limiter, store, config.clone(), cancel);
    let summary = orchestrator.evaluate_many(skills, opts).await;

    print_run_summary(&summary, &load_failures);

    let all_loaded = load_failures.is_empty();
    if summary.all_complete() && all_loaded {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_run_summary(summary: &RunSummary, load_failures: &[(String, String)]) {
    println!("\nRun summary:");
    for outcome in &summary.outcomes {
        let win_rate = outcome
            .win_rate
            .map_or_else(|| "n/a".to_string(), |rate| format!("{rate:.1}%"));
        println!(
            "  {:<25} {:<9} grade={:<18} win_rate={:<8} trials={} errored={}",
            outcome.skill_id,
            outcome.status.to_string(),
            display_grade(outcome.grade),
            win_rate,
            outcome.trial_count,
            outcome.errored_trials
        );
        if let Some(detail) = &outcome.detail {
            println!("      reason: {detail}");
        }
    }
    for (id, reason) in load_failures {
        println!("  {id:<25} skipped   reason: {reason}");
    }
}
