//! `rack plan`: display the start order and build groups without touching
//! the engine.

use std::process::ExitCode;

use clap::Args;
use rack_build::BuildPlan;
use serde::Serialize;

use super::Project;
use crate::output::{BOLD, CYAN, DIM, RESET};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct PlanReport<'a> {
    app: &'a str,
    order: Vec<String>,
    images: BuildPlan,
}

/// Executes the `plan` command.
///
/// # Errors
///
/// Returns an error if the link graph has a cycle or a build context
/// cannot be resolved.
pub fn execute(args: &PlanArgs, project: &Project) -> anyhow::Result<ExitCode> {
    let order = rack_manifest::graph::start_order(&project.manifest)?;
    let images = BuildPlan::new(&project.manifest, &project.app)?;
    let report = PlanReport {
        app: &project.app,
        order,
        images,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &PlanReport<'_>) {
    println!("{BOLD}Plan for {}{RESET}", report.app);
    println!();
    println!("  Start order:");
    for (i, name) in report.order.iter().enumerate() {
        println!("    {}. {name}", i + 1);
    }

    if !report.images.builds.is_empty() {
        println!();
        println!("  Builds:");
        for group in &report.images.builds {
            let dockerfile = group
                .dockerfile
                .as_deref()
                .map_or_else(String::new, |d| format!(" {DIM}({d}){RESET}"));
            println!(
                "    {CYAN}{}{RESET}{dockerfile} {DIM}as {}{RESET}: {}",
                group.context.display(),
                group.tag,
                group.services.join(", ")
            );
        }
    }

    if !report.images.pulls.is_empty() {
        println!();
        println!("  Pulls:");
        for image in &report.images.pulls {
            println!("    {CYAN}{image}{RESET}");
        }
    }
}
