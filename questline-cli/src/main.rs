//! Operator command line for the Questline engine.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use questline_engine::{Engine, TaskStatus, UseOutcome};

#[derive(Debug, Parser)]
#[command(name = "questline", version)]
#[command(about = "Questline engine operations: draws, sweeps and document inspection")]
struct Args {
    /// Path to the persisted document
    #[arg(long, default_value = "./questline_data.json")]
    data: PathBuf,

    /// Seed the draw RNG for reproducible loot results
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a summary of the current document
    Show,
    /// Use an item: open loot boxes, redeem goods, emit GM commands
    UseItem {
        name: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Buy an item from the catalog with credits
    Buy {
        name: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Craft an item from one of its recipes
    Craft {
        name: String,
        #[arg(long, default_value_t = 0)]
        recipe: usize,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Convert credits between currencies
    Convert {
        from: String,
        to: String,
        amount: f64,
    },
    /// Complete a task and grant its rewards
    Complete {
        id: u64,
        /// Record the completion without paying out rewards
        #[arg(long)]
        no_rewards: bool,
    },
    /// Run the recurring-task recycle sweep
    Sweep,
    /// Run the completed-task archive sweep
    Archive,
    /// Run whichever daily auto tasks are still due today
    Auto,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut engine = Engine::new(&args.data);
    if let Some(seed) = args.seed {
        engine = engine.with_seed(seed);
    }

    match args.command {
        Command::Show => show(&mut engine),
        Command::UseItem { name, count } => use_item(&mut engine, &name, count),
        Command::Buy { name, count } => {
            let cost = engine
                .buy_item(&name, count)
                .with_context(|| format!("buying {count} x {name}"))?;
            println!("{} bought {count} x {name}", "ok".green().bold());
            for (currency, amount) in &cost {
                println!("  {} -{amount} {currency}", "credit".cyan());
            }
            Ok(())
        }
        Command::Craft {
            name,
            recipe,
            count,
        } => {
            engine
                .craft(&name, recipe, count)
                .with_context(|| format!("crafting {count} x {name}"))?;
            println!("{} crafted {count} x {name}", "ok".green().bold());
            Ok(())
        }
        Command::Convert { from, to, amount } => {
            let debited = engine
                .convert_credits(&from, &to, amount)
                .with_context(|| format!("converting {from} to {to}"))?;
            println!(
                "{} converted {debited} {from} into {amount} {to}",
                "ok".green().bold()
            );
            Ok(())
        }
        Command::Complete { id, no_rewards } => {
            let reward = engine
                .complete_task(id, !no_rewards)
                .with_context(|| format!("completing task {id}"))?;
            println!("{} task {id} completed", "ok".green().bold());
            for (credit, amount) in &reward.credits {
                println!("  {} +{amount} {credit}", "credit".cyan());
            }
            for (item, count) in &reward.items {
                println!("  {} +{count} {item}", "item".cyan());
            }
            for (property, amount) in &reward.properties {
                println!("  {} +{amount} {property}", "property".cyan());
            }
            if reward.exp > 0.0 {
                println!("  {} +{}", "exp".cyan(), reward.exp);
            }
            Ok(())
        }
        Command::Sweep => {
            let updated = engine.sweep_cycle_tasks().context("recycle sweep")?;
            println!("{} {updated} recurring task(s) reset", "ok".green().bold());
            Ok(())
        }
        Command::Archive => {
            let archived = engine.sweep_archive().context("archive sweep")?;
            println!("{} {archived} task(s) archived", "ok".green().bold());
            Ok(())
        }
        Command::Auto => {
            let outcome = engine.run_daily_auto_tasks_if_due();
            println!(
                "archive: {} ({} task(s)), recycle: {} ({} task(s))",
                run_label(outcome.archive_ran),
                outcome.tasks_archived,
                run_label(outcome.recycle_ran),
                outcome.tasks_recycled,
            );
            Ok(())
        }
    }
}

fn run_label(ran: bool) -> String {
    if ran {
        "ran".green().to_string()
    } else {
        "already done today".dimmed().to_string()
    }
}

fn show(engine: &mut Engine) -> Result<()> {
    let doc = engine.load_document();

    println!("{}", "credits".bold());
    for (credit, balance) in &doc.credits {
        println!("  {credit}: {balance}");
    }

    println!("{}", "backpack".bold());
    for (item, count) in doc.backpack.iter().filter(|(_, count)| **count > 0) {
        println!("  {item}: {count}");
    }

    println!("{}", "tasks".bold());
    for task in doc.tasks.iter().filter(|t| !t.archived) {
        let status = match task.status {
            TaskStatus::Complete => "complete".green(),
            TaskStatus::InProgress | TaskStatus::Recurring => "active".yellow(),
            TaskStatus::Incomplete => "incomplete".red(),
        };
        println!(
            "  #{} {} [{status}] {:?} {}/{}",
            task.id, task.name, task.cycle, task.completed_count, task.max_completions
        );
    }

    let live_recurring = doc.recurring_tasks().count();
    let pending_archive = doc.unarchived_completed().count();
    println!(
        "{} {} item kind(s), {} task(s) ({live_recurring} recurring, {pending_archive} awaiting archive)",
        "totals".bold(),
        doc.items.len(),
        doc.tasks.len(),
    );
    Ok(())
}

fn use_item(engine: &mut Engine, name: &str, count: u32) -> Result<()> {
    let outcome = engine
        .use_item(name, count)
        .with_context(|| format!("using {count} x {name}"))?;
    match outcome {
        UseOutcome::LootBox(report) => {
            if report.summary.is_empty() {
                println!("{} nothing dropped this time", "empty".dimmed());
            } else {
                for (reward, total) in &report.summary {
                    println!("{} {reward} x {total}", "drop".green().bold());
                }
            }
            let empties = report.outcomes.iter().filter(|o| o.reward.is_none()).count();
            log::debug!(
                "{} outcome(s), {empties} empty",
                report.outcomes.len()
            );
        }
        UseOutcome::Physical { description } => {
            println!("{} {description}", "redeemed".green().bold());
        }
        UseOutcome::Command { command } => {
            println!("{} {command}", "gm-command".cyan().bold());
        }
    }
    Ok(())
}
