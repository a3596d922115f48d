//! malpac CLI Module
//!
//! Command-line driver for training runs and package prediction.

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{Settings, DEFAULT_SETTINGS_PATH};
use crate::features::Label;
use crate::inference::{write_report, Predictor};
use crate::preprocessing::PreprocessMethod;
use crate::training::{
    Action, Activation, Gamma, HyperparameterSet, ModelFamily, Orchestrator, Solver, TrainRequest,
};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn alert(s: &str) -> ColoredString  { s.truecolor(240, 110, 100) }

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn label_text(label: Label) -> ColoredString {
    match label {
        Label::Malicious => alert(label.as_str()).bold(),
        Label::Benign => ok(label.as_str()),
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "malpac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and apply malicious package classifiers")]
#[command(long_about = None)]
pub struct Cli {
    /// Settings file (defaults apply when the default path is absent)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a family's grid or fit and save one model
    Train(TrainArgs),

    /// Classify feature files with a saved model
    Predict(PredictArgs),
}

#[derive(Args)]
pub struct TrainArgs {
    /// Directory of malicious feature files (repeatable)
    #[arg(short, long = "malicious", required = true, num_args = 1..)]
    pub malicious: Vec<PathBuf>,

    /// Directory of benign feature files (repeatable)
    #[arg(short, long = "benign", required = true, num_args = 1..)]
    pub benign: Vec<PathBuf>,

    /// Model family (RF, MLP, NB, SVM)
    #[arg(short = 'o', long = "model")]
    pub model: ModelFamily,

    /// Preprocess method (none, standardize, min-max)
    #[arg(short, long, default_value = "none")]
    pub preprocess: PreprocessMethod,

    /// Action (validate, save)
    #[arg(short, long, default_value = "validate")]
    pub action: Action,

    #[command(flatten)]
    pub hyper: HyperArgs,
}

/// Hyperparameters read by `--action save`
#[derive(Args, Default)]
pub struct HyperArgs {
    /// RF number of trees
    #[arg(long)]
    pub trees: Option<usize>,

    /// RF maximum depth (unbounded when absent)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// MLP learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// MLP hidden layer sizes, comma separated
    #[arg(long, value_delimiter = ',')]
    pub hidden_layers: Option<Vec<usize>>,

    /// MLP maximum iterations
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// MLP optimizer (sgd, adam, lbfgs)
    #[arg(long)]
    pub optimizer: Option<Solver>,

    /// MLP activation (identity, logistic, tanh, relu)
    #[arg(long)]
    pub activation: Option<Activation>,

    /// NB variance smoothing
    #[arg(long)]
    pub smoothing: Option<f64>,

    /// SVM kernel coefficient: a number, `scale` or `auto`
    #[arg(long, value_parser = parse_gamma)]
    pub gamma: Option<Gamma>,

    /// SVM regularization
    #[arg(long = "c")]
    pub c: Option<f64>,
}

fn parse_gamma(raw: &str) -> Result<Gamma, String> {
    Ok(Gamma::parse(raw))
}

impl HyperArgs {
    pub fn to_set(&self) -> HyperparameterSet {
        HyperparameterSet {
            n_trees: self.trees,
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            hidden_layer_sizes: self.hidden_layers.clone(),
            max_iterations: self.max_iterations,
            optimizer: self.optimizer,
            activation: self.activation,
            var_smoothing: self.smoothing,
            gamma: self.gamma.clone(),
            c: self.c,
        }
    }
}

#[derive(Args)]
#[command(group(ArgGroup::new("input").required(true).args(["file", "dir"])))]
pub struct PredictArgs {
    /// Model family (RF, MLP, NB, SVM)
    #[arg(short = 'o', long = "model")]
    pub model: ModelFamily,

    /// Single feature file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Directory of feature files
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Report path for `--dir` (defaults to the reports directory)
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

// ─── Settings ──────────────────────────────────────────────────────────────────

/// Load the settings file; a missing default file falls back to built-in defaults
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_SETTINGS_PATH);
            if default.is_file() {
                Ok(Settings::load(default)?)
            } else {
                Ok(Settings::default())
            }
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(settings: &Settings, args: &TrainArgs) -> anyhow::Result<()> {
    section("Train");

    let hyperparameters = args.hyper.to_set();
    settings
        .ensure_choice(args.model, Some(args.preprocess), &hyperparameters)
        .context("option not enabled in settings")?;

    kv("Model", args.model.code());
    kv("Preprocess", args.preprocess.as_str());
    kv("Action", &args.action.to_string());

    let request = TrainRequest {
        malicious_dirs: args.malicious.clone(),
        benign_dirs: args.benign.clone(),
        preprocess: args.preprocess,
        family: args.model,
        action: args.action,
        hyperparameters,
    };

    let label = match args.action {
        Action::Validate => "Validating grid",
        Action::Save => "Fitting model",
    };
    step_run(label);
    let start = Instant::now();
    let written = Orchestrator::from_settings(settings).train(&request)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    step_ok(&format!("Wrote {}", written.display()));
    println!();
    Ok(())
}

pub fn cmd_predict(settings: &Settings, args: &PredictArgs) -> anyhow::Result<()> {
    section("Predict");

    settings
        .ensure_choice(args.model, None, &HyperparameterSet::new())
        .context("option not enabled in settings")?;

    let predictor = Predictor::new(settings.storage());

    if let Some(file) = &args.file {
        let label = predictor.predict(args.model, file)?;
        kv("Package", &file.display().to_string());
        println!("  {:<16} {}", muted("Prediction"), label_text(label));
        println!();
        return Ok(());
    }

    if let Some(dir) = &args.dir {
        step_run(&format!("Classifying {}", dir.display()));
        let start = Instant::now();
        let predictions = predictor.predict_dir(args.model, dir)?;
        step_done(&format!("{} packages in {:.2?}", predictions.len(), start.elapsed()));

        for p in predictions.iter().filter(|p| p.label == Label::Malicious) {
            println!("    {} {}", label_text(p.label), p.package);
        }

        let report = args.report.clone().unwrap_or_else(|| {
            settings
                .storage()
                .reports
                .join(format!("{}_predictions.csv", args.model.code()))
        });
        let path = write_report(&predictions, &report)?;
        step_ok(&format!("Wrote {}", path.display()));
        println!();
    }

    Ok(())
}
