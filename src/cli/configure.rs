use crate::cli::ConfigureArgs;
use anyhow::{bail, Context};
use council::config::{default_agents_path, PromptMode};
use council::{AgentDescriptor, AgentKind, AgentsConfig, Roster};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

pub fn execute(args: ConfigureArgs) -> anyhow::Result<()> {
    let path = args.path.unwrap_or_else(default_agents_path);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let config = prompt_agents(&mut stdin.lock(), &mut stdout.lock())?;

    // Same checks a run would apply
    Roster::from_config(config.clone(), &path)?;
    config.save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Ask for planners until a blank name, then for an optional judge
pub fn prompt_agents<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<AgentsConfig> {
    let mut config = AgentsConfig::default();

    writeln!(out, "Configure planner agents (blank name to finish).")?;
    while let Some(descriptor) = prompt_descriptor(input, out, "Planner name")? {
        if config.planners.iter().any(|p| p.name == descriptor.name) {
            writeln!(out, "'{}' is already configured", descriptor.name)?;
            continue;
        }
        config.planners.push(descriptor);
    }
    if config.planners.is_empty() {
        bail!("At least one planner is required");
    }

    writeln!(out, "Judge agent (blank to use the first planner).")?;
    config.judge = prompt_descriptor(input, out, "Judge name")?;
    Ok(config)
}

fn prompt_descriptor<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
) -> anyhow::Result<Option<AgentDescriptor>> {
    let Some(name) = ask(input, out, label)? else {
        return Ok(None);
    };

    let kind = loop {
        let answer = ask(input, out, "Kind [codex|claude|gemini|command]")?
            .context("Unexpected end of input")?;
        match answer.parse::<AgentKind>() {
            Ok(kind) => break kind,
            Err(e) => writeln!(out, "{}", e)?,
        }
    };

    let mut descriptor = AgentDescriptor::new(name, kind);
    descriptor.model = ask(input, out, "Model (optional)")?;
    descriptor.reasoning_effort = ask(input, out, "Reasoning effort (optional)")?;
    descriptor.prompt_mode = match ask(input, out, "Prompt mode [arg|stdin] (optional)")? {
        Some(mode) if mode.eq_ignore_ascii_case("stdin") => Some(PromptMode::Stdin),
        Some(_) => Some(PromptMode::Arg),
        None => None,
    };
    descriptor.binary = match kind {
        AgentKind::Command => Some(PathBuf::from(
            ask(input, out, "Binary")?.context("A command agent needs a binary")?,
        )),
        _ => ask(input, out, "Binary override (optional)")?.map(PathBuf::from),
    };
    if let Some(args) = ask(input, out, "Extra args, space separated (optional)")? {
        descriptor.extra_args = args.split_whitespace().map(str::to_string).collect();
    }
    Ok(Some(descriptor))
}

/// Prompt for one line; `None` for blank input or end of input
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
) -> io::Result<Option<String>> {
    write!(out, "{}: ", label)?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let line = line.trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}
