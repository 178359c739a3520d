//! Demo front-end: plan a path through a planar world described by a
//! typed config file, dump the grown net and the path as SVT.
//!
//! Exit codes: 0 success (path found or not — see stdout), 1 bad
//! arguments, 2 config/environment load failure.

mod config;
mod world;

use clap::{App, Arg};
use config::Config;
use neuroplan_core::params::{NnParams, PlanParams};
use neuroplan_core::plan::PlanEngine;
use std::fs;
use std::io::Write;
use std::process;
use world::{World, WorldOracle};

const EXIT_OK: i32 = 0;
const EXIT_BAD_ARGS: i32 = 1;
const EXIT_ENV: i32 = 2;

fn main() {
    env_logger::init();
    process::exit(run());
}

fn run() -> i32 {
    let matches = App::new("neuroplan")
        .about("Grows a neural graph over a planar world and plans a path through it")
        .arg(Arg::with_name("cfg").help("World config file").required(true))
        .arg(
            Arg::with_name("max-steps")
                .long("max-steps")
                .takes_value(true)
                .help("Step budget before giving up [default: from config or 1000000]"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .help("Seed for the sampling RNG (entropy when absent)"),
        )
        .arg(
            Arg::with_name("rmax")
                .long("rmax")
                .takes_value(true)
                .help("Degree cap override"),
        )
        .arg(
            Arg::with_name("h")
                .long("h")
                .takes_value(true)
                .help("Spatial resolution override"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("Write an SVT dump of the grown net (and path) here"),
        )
        .arg(
            Arg::with_name("classes")
                .long("classes")
                .help("Dump per-class colored SVT sections instead of the whole net"),
        )
        .arg(
            Arg::with_name("print-params")
                .long("print-params")
                .help("Echo the resolved engine parameters as JSON"),
        )
        .get_matches_safe();

    let matches = match matches {
        Ok(m) => m,
        Err(e) if e.kind == clap::ErrorKind::HelpDisplayed
            || e.kind == clap::ErrorKind::VersionDisplayed =>
        {
            println!("{}", e.message);
            return EXIT_OK;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            return EXIT_BAD_ARGS;
        }
    };

    let parse_num = |name: &str| -> Result<Option<f64>, i32> {
        match matches.value_of(name) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                eprintln!("invalid value for --{}: '{}'", name, raw);
                EXIT_BAD_ARGS
            }),
        }
    };
    let max_steps_arg = match parse_num("max-steps") {
        Ok(v) => v,
        Err(code) => return code,
    };
    let seed = match parse_num("seed") {
        Ok(v) => v.map(|s| s as u64),
        Err(code) => return code,
    };
    let rmax = match parse_num("rmax") {
        Ok(v) => v,
        Err(code) => return code,
    };
    let h_arg = match parse_num("h") {
        Ok(v) => v,
        Err(code) => return code,
    };

    let cfg_path = matches.value_of("cfg").expect("cfg is required");
    let cfg_text = match fs::read_to_string(cfg_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("cannot read '{}': {}", cfg_path, e);
            return EXIT_ENV;
        }
    };
    let cfg = match Config::parse(&cfg_text) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cannot parse '{}': {}", cfg_path, e);
            return EXIT_ENV;
        }
    };
    log::debug!("config '{}' defines {} keys", cfg_path, cfg.keys().count());
    let world = match World::from_config(&cfg) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("bad world in '{}': {}", cfg_path, e);
            return EXIT_ENV;
        }
    };
    let dump_name = cfg.str("name").unwrap_or("net").to_string();

    let mut params = PlanParams {
        nn: NnParams::Grid {
            aabb: world.aabb.to_vec(),
            cells_per_axis: 32,
        },
        ..Default::default()
    };
    if let Some(h) = cfg.flt("h").or(h_arg) {
        params.h = h;
    }
    if let Some(lambda) = cfg.int("lambda") {
        params.lambda = lambda as usize;
    }
    if let Some(warm) = cfg.int("warm_start") {
        params.warm_start = warm as usize;
    }
    if let Some(r) = rmax {
        params.r_max = r as usize;
    }
    let max_steps = max_steps_arg
        .map(|v| v as u64)
        .or_else(|| cfg.int("max_steps").map(|v| v as u64))
        .unwrap_or(1_000_000);

    if matches.is_present("print-params") {
        match serde_json::to_string_pretty(&params) {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("cannot serialize params: {}", e),
        }
    }

    let mut engine = match PlanEngine::new(params) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("bad parameters: {}", e);
            return EXIT_BAD_ARGS;
        }
    };
    let start = world.start.clone();
    let goal = world.goal.clone();
    engine.add_ops(Box::new(WorldOracle::new(world, max_steps, seed)));

    log::info!(
        "planning from {:?} to {:?}, budget {} steps",
        start.coords(),
        goal.coords(),
        max_steps
    );
    let path = match engine.plan(&start, &goal) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("engine failure: {}", e);
            return EXIT_BAD_ARGS;
        }
    };

    match &path {
        Some(path) => {
            println!("path with {} waypoints:", path.len());
            for w in path {
                let coords: Vec<String> =
                    w.coords().iter().map(|c| format!("{:.6}", c)).collect();
                println!("  {}", coords.join(" "));
            }
        }
        None => println!("no path found within {} steps", max_steps),
    }
    log::info!(
        "final net: {} vertices, {} edges, avg edge length {:.4}",
        engine.graph().vertex_count(),
        engine.graph().edge_count(),
        engine.avg_edge_len()
    );

    if let Some(out_path) = matches.value_of("output") {
        let mut file = match fs::File::create(out_path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("cannot create '{}': {}", out_path, e);
                return EXIT_ENV;
            }
        };
        let dump = if matches.is_present("classes") {
            engine.dump_svt_classes(&mut file, Some(&dump_name))
        } else {
            engine.dump_svt(&mut file, Some(&dump_name))
        };
        let path_dump = dump.and_then(|_| match &path {
            Some(points) => dump_path_svt(&mut file, points),
            None => Ok(()),
        });
        if let Err(e) = path_dump {
            eprintln!("cannot write '{}': {}", out_path, e);
            return EXIT_ENV;
        }
    }

    EXIT_OK
}

/// Appends the path as its own green SVT section.
fn dump_path_svt<W: Write>(out: &mut W, points: &[neuroplan_core::point::Point]) -> std::io::Result<()> {
    writeln!(out, "--------")?;
    writeln!(out, "Name: Path")?;
    writeln!(out, "Point color: 0.1 0.8 0.1")?;
    writeln!(out, "Edge color: 0.1 0.8 0.1")?;
    writeln!(out, "Points:")?;
    for w in points {
        let coords: Vec<String> = w.coords().iter().map(|c| c.to_string()).collect();
        writeln!(out, "{}", coords.join(" "))?;
    }
    writeln!(out, "Edges:")?;
    for i in 0..points.len().saturating_sub(1) {
        writeln!(out, "{} {}", i, i + 1)?;
    }
    writeln!(out, "--------")
}
