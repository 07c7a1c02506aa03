use anyhow::Context;
use colored::Colorize;
use fedi_protocol::{CompStr, Filters};
use fedi_sdk::{Repository, SdkError};
use fedi_types::{
    Account, Entity, FollowStatus, Item, MimeType, ModerationOp, ModerationTarget, Renderable,
};
use serde::Serialize;
use tracing::info;

use crate::cli::*;
use crate::config::CliConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(&cli.config)?;
    let repository = Repository::new(config.client.clone()).context("creating repository")?;
    match cli.command {
        Command::Activities(args) => cmd_activities(&repository, &config, args, cli.format).await,
        Command::Accounts(args) => cmd_accounts(&repository, &config, args, cli.format).await,
        Command::Block(args) => cmd_block(&repository, &config, args, cli.format).await,
        Command::Report(args) => cmd_report(&repository, &config, args, cli.format).await,
    }
}

async fn cmd_activities(
    repository: &Repository,
    config: &CliConfig,
    args: ActivitiesArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let viewer = config.operator().ok();
    let cursor = repository
        .load_activities(viewer.as_ref(), vec![activity_filters(&args)])
        .await?;
    if format == OutputFormat::Json {
        return print_json(&cursor);
    }
    if cursor.is_empty() {
        println!("No activities.");
    }
    for entity in &cursor.items {
        println!("{}", describe(entity));
    }
    for warning in &cursor.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    if let Some(after) = &cursor.after {
        println!("{} --after {}", "more:".dimmed(), after);
    }
    Ok(())
}

async fn cmd_accounts(
    repository: &Repository,
    config: &CliConfig,
    args: AccountsArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let viewer = config.operator().ok();
    let accounts = repository
        .load_accounts(viewer.as_ref(), vec![account_filters(&args)])
        .await?;
    if format == OutputFormat::Json {
        return print_json(&accounts);
    }
    if accounts.is_empty() {
        println!("No accounts.");
    }
    for account in &accounts {
        println!("{}", describe_account(account));
    }
    Ok(())
}

async fn cmd_block(
    repository: &Repository,
    config: &CliConfig,
    args: BlockArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let operator = config.operator()?;
    let target = repository
        .load_account_by_iri(&args.account)
        .await
        .with_context(|| format!("loading {}", args.account))?;
    let reason = args.reason.as_deref().map(reason_item);
    let op = repository
        .block_account(&operator, &target, reason.as_ref())
        .await
        .map_err(describe_failure)?;
    info!(operator = %operator.handle, target = %args.account, "account blocked");
    report_op(&op, format)
}

async fn cmd_report(
    repository: &Repository,
    config: &CliConfig,
    args: ReportArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let operator = config.operator()?;
    let item = repository
        .load_item(Some(&operator), &args.item)
        .await
        .with_context(|| format!("loading {}", args.item))?;
    let reason = args.reason.as_deref().map(reason_item);
    let op = repository
        .report_item(&operator, &item, reason.as_ref())
        .await
        .map_err(describe_failure)?;
    info!(operator = %operator.handle, target = %args.item, "item reported");
    report_op(&op, format)
}

fn report_op(op: &ModerationOp, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(op);
    }
    println!("{} {}", "✓".green().bold(), describe_moderation(op));
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_failure(err: SdkError) -> anyhow::Error {
    anyhow::anyhow!("{err} (status {})", err.status_code())
}

fn reason_item(text: &str) -> Item {
    Item {
        data: text.to_string(),
        mime_type: MimeType::Text,
        ..Item::default()
    }
}

pub fn activity_filters(args: &ActivitiesArgs) -> Filters {
    let mut filters = Filters::new().with_max_items(args.max_items);
    filters.kind = parsed(&args.types);
    if !args.actor.is_empty() {
        filters.actor = Some(Box::new(Filters {
            iri: parsed(&args.actor),
            ..Filters::default()
        }));
    }
    if !args.object.is_empty() {
        filters.object = Some(Box::new(Filters {
            iri: parsed(&args.object),
            ..Filters::default()
        }));
    }
    filters
}

pub fn account_filters(args: &AccountsArgs) -> Filters {
    let mut filters = Filters::new().with_max_items(args.max_items);
    filters.name = parsed(&args.name);
    filters.kind = parsed(&args.types);
    filters
}

fn parsed(values: &[String]) -> Vec<CompStr> {
    values.iter().map(|v| CompStr::parse(v)).collect()
}

fn handle_of(account: Option<&Account>) -> String {
    match account {
        Some(a) if !a.handle.is_empty() => a.handle.clone(),
        Some(a) => a.iri().unwrap_or(a.hash.as_str()).to_string(),
        None => "?".to_string(),
    }
}

fn date_of(entity: &dyn Renderable) -> String {
    entity
        .date()
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(16))
}

pub fn describe(entity: &Entity) -> String {
    let body = match entity {
        Entity::Item(item) => {
            let text = if item.title.is_empty() { &item.data } else { &item.title };
            let text: String = text.chars().take(60).collect();
            let state = if item.deleted { " [deleted]".red().to_string() } else { String::new() };
            format!(
                "{} {} by {}: {}{}",
                "item".cyan(),
                item.hash.short().yellow(),
                handle_of(item.author()).bold(),
                text,
                state
            )
        }
        Entity::Account(account) => describe_account(account),
        Entity::Vote(vote) => {
            let weight = match vote.weight {
                w if w > 0 => "+1".green(),
                w if w < 0 => "-1".red(),
                _ => "undo".dimmed(),
            };
            let item = vote.item_hash().map(|h| h.short().to_string()).unwrap_or_default();
            format!(
                "{} {} by {} on {}",
                "vote".cyan(),
                weight,
                handle_of(vote.submitted_by.as_deref()).bold(),
                item.yellow()
            )
        }
        Entity::FollowRequest(follow) => {
            let status = match follow.status {
                FollowStatus::Pending => "pending".yellow(),
                FollowStatus::Accepted => "accepted".green(),
                FollowStatus::Rejected => "rejected".red(),
            };
            format!(
                "{} {} -> {} {}",
                "follow".cyan(),
                handle_of(follow.submitted_by.as_deref()).bold(),
                handle_of(follow.object.as_deref()),
                status
            )
        }
        Entity::Moderation(op) => describe_moderation(op),
    };
    format!("{} {}", date_of(entity).dimmed(), body)
}

fn describe_account(account: &Account) -> String {
    let mut line = format!(
        "{} {} {}",
        "account".cyan(),
        account.handle.bold(),
        account.iri().unwrap_or_default().dimmed()
    );
    if account.deleted {
        line.push_str(&format!(" {}", "[deleted]".red()));
    }
    line
}

fn describe_moderation(op: &ModerationOp) -> String {
    let target = match &op.object {
        ModerationTarget::Item(item) => format!("item {}", item.hash.short()),
        ModerationTarget::Account(account) => format!("account {}", handle_of(Some(account))),
        ModerationTarget::Unresolved(iri) => iri.clone(),
    };
    let mut line = format!(
        "{} by {} on {}",
        format!("{:?}", op.kind).to_lowercase().magenta(),
        handle_of(op.submitted_by.as_deref()).bold(),
        target
    );
    if let Some(reason) = &op.reason {
        line.push_str(&format!(": {reason}"));
    }
    line
}
