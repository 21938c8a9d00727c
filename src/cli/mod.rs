// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Typical session:
//   story-align prepare --stories data/stories.csv \
//       --output data/train_stories.bin --vocab-out data/default.voc \
//       --holdout 0.1 --holdout-output data/test_stories.bin
//   story-align train-alignment --epochs 10
//   story-align eval-alignment --run-dir builds/<run>-alignment
//   story-align train-scheduler --epochs 20
//   story-align train-entailment --snli data/snli_1.0/snli_1.0_train.jsonl
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::Path;

use commands::Commands;

#[derive(Parser, Debug)]
#[command(
    name = "story-align",
    version = "0.1.0",
    about = "Adversarial sentence alignment, sentence ordering and ending entailment on story-cloze data."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case; nothing is computed here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Prepare(args) => {
                use crate::application::prepare_use_case::PrepareUseCase;

                let report = PrepareUseCase::new(args.into()).execute()?;
                println!(
                    "Prepared {} records ({} held out){}",
                    report.kept,
                    report.held_out,
                    report.vocab_size.map(|n| format!(", vocabulary of {n}")).unwrap_or_default()
                );
            }

            Commands::TrainAlignment(args) => {
                use crate::application::alignment_use_case::AlignmentUseCase;

                tracing::info!("Starting alignment training on '{}'", args.paths.train_records);
                let summary = AlignmentUseCase::new(args.into()).train()?;
                match summary.best {
                    Some(best) => println!(
                        "Training complete. Best checkpoint: step {} (disrc_src_loss {:.4}) at '{}'",
                        best.step,
                        best.loss,
                        best.path.display()
                    ),
                    None => println!("Training complete. No evaluation ran, so no checkpoint was kept."),
                }
            }

            Commands::EvalAlignment(args) => {
                use crate::application::alignment_use_case::AlignmentUseCase;

                let report = AlignmentUseCase::evaluate(Path::new(&args.run_dir), args.test_records)?;
                println!(
                    "\nAccuracy: {:.2}% ({}/{})",
                    report.accuracy() * 100.0,
                    report.hits,
                    report.total
                );
            }

            Commands::TrainScheduler(args) => {
                use crate::application::scheduler_use_case::SchedulerUseCase;

                tracing::info!("Starting scheduler training on '{}'", args.paths.train_records);
                let summary = SchedulerUseCase::new(args.into()).execute()?;
                if let Some((epoch, acc)) = summary.accuracies.last() {
                    println!("Training complete. Last ending accuracy (epoch {epoch}): {:.1}%", acc * 100.0);
                }
                println!("{} checkpoint(s) written.", summary.saved.len());
            }

            Commands::TrainEntailment(args) => {
                use crate::application::entailment_use_case::EntailmentUseCase;

                tracing::info!("Starting entailment training on '{}'", args.snli);
                let summary = EntailmentUseCase::new(args.into()).execute()?;
                match summary.best {
                    Some(best) => println!(
                        "Training complete after {} steps. Best checkpoint: step {} (val_loss {:.4}) at '{}'",
                        summary.steps,
                        best.step,
                        best.loss,
                        best.path.display()
                    ),
                    None => println!("Training complete. No validation batch ran, so no checkpoint was kept."),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alignment_use_case::AlignmentConfig;
    use crate::application::entailment_use_case::EntailmentConfig;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_train_alignment_args_become_config() {
        let cli = Cli::try_parse_from([
            "story-align", "train-alignment", "--epochs", "3", "--limit-eval-steps", "7", "--seed", "9",
        ])
        .unwrap();
        let Commands::TrainAlignment(args) = cli.command else { panic!("wrong subcommand") };
        let cfg = AlignmentConfig::from(args);
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.limit_eval_steps, Some(7));
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.embed_backoff_ms, AlignmentConfig::default().embed_backoff_ms);
    }

    #[test]
    fn test_train_entailment_args_become_config() {
        let cli = Cli::try_parse_from([
            "story-align", "train-entailment", "--snli", "pairs.jsonl", "--steps-per-epoch", "20",
        ])
        .unwrap();
        let Commands::TrainEntailment(args) = cli.command else { panic!("wrong subcommand") };
        let cfg = EntailmentConfig::from(args);
        assert_eq!(cfg.snli_train, "pairs.jsonl");
        assert_eq!(cfg.steps_per_epoch, 20);
        assert_eq!(cfg.hidden1, 1000);
        assert_eq!(cfg.embed_backoff_ms, EntailmentConfig::default().embed_backoff_ms);
    }

    #[test]
    fn test_prepare_requires_stories() {

        assert!(Cli::try_parse_from(["story-align", "prepare", "--output", "x.bin"]).is_err());
    }
}
