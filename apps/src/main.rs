//! Command line front end: solve one of the builtin planning problems with
//! the selected planner and print the plan.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use strata_planning::domains;
use strata_planning::graphplan::GraphPlan;
use strata_planning::htn::{hierarchical_search, RefinementLibrary, SchedulingProblem};
use strata_planning::pop::PartialOrderPlanner;
use strata_planning::strips::{GroundAction, Problem};

#[derive(Parser)]
#[command(name = "strata", about = "Solve a builtin planning problem")]
struct Opt {
    /// Problem to solve: air-cargo, spare-tire, three-block-tower, cake,
    /// shopping, double-tennis, go-to-sfo
    domain: String,

    #[arg(short, long, value_enum, default_value = "graphplan")]
    algorithm: Algorithm,

    /// Print the plan as a single action sequence instead of layers
    #[arg(long)]
    linear: bool,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Algorithm {
    Graphplan,
    Pop,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::Uptime::from(std::time::Instant::now()))
        .with_max_level(opt.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let layers = match builtin(&opt.domain)? {
        Builtin::Classical(problem) => match opt.algorithm {
            Algorithm::Graphplan => {
                let plan = GraphPlan::solve(&problem).context("planning failed")?;
                match plan {
                    Some(plan) => plan.0,
                    None => {
                        eprintln!("no plan: the planning graph leveled off");
                        std::process::exit(1);
                    }
                }
            }
            Algorithm::Pop => match PartialOrderPlanner::solve(&problem) {
                Ok(plan) => plan,
                Err(e) => {
                    eprintln!("no plan: {e}");
                    std::process::exit(1);
                }
            },
        },
        Builtin::Hierarchical(problem, library) => {
            let Some(plan) = hierarchical_search(&problem, &library) else {
                eprintln!("no plan: refinement search exhausted");
                std::process::exit(1);
            };
            vec![plan
                .iter()
                .map(|t| t.schema.ground(&t.schema.params().to_vec()))
                .collect()]
        }
    };

    print_plan(&layers, opt.linear);
    Ok(())
}

enum Builtin {
    Classical(Problem),
    Hierarchical(SchedulingProblem, RefinementLibrary),
}

fn builtin(name: &str) -> Result<Builtin> {
    Ok(match name {
        "air-cargo" => Builtin::Classical(domains::air_cargo()),
        "spare-tire" => Builtin::Classical(domains::spare_tire()),
        "three-block-tower" => Builtin::Classical(domains::three_block_tower()),
        "cake" => Builtin::Classical(domains::have_cake_and_eat_cake_too()),
        "shopping" => Builtin::Classical(domains::shopping_problem()),
        "double-tennis" => Builtin::Classical(domains::double_tennis_problem()),
        "go-to-sfo" => {
            let (problem, library) = domains::go_to_sfo();
            Builtin::Hierarchical(problem, library)
        }
        _ => bail!(
            "unknown problem '{name}' (expected one of: air-cargo, spare-tire, \
             three-block-tower, cake, shopping, double-tennis, go-to-sfo)"
        ),
    })
}

fn print_plan(layers: &[Vec<GroundAction>], linear: bool) {
    if linear {
        for action in layers.iter().flatten().filter(|a| !a.persistence) {
            println!("{action}");
        }
    } else {
        for (i, layer) in layers.iter().enumerate() {
            let steps: Vec<String> = layer.iter().map(|a| a.to_string()).collect();
            println!("{i}: {}", steps.join(", "));
        }
    }
}
