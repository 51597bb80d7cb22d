use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use coco_index::COCO;

#[derive(Parser)]
#[command(name = "coco-index")]
#[command(about = "Index, query and normalize COCO annotation files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print section and index sizes of an annotation file
    Info {
        /// Path to ground truth annotations JSON file
        #[arg(long, env = "COCO_GT")]
        gt: PathBuf,
    },

    /// Print annotation IDs matching the given filters, one per line
    AnnIds {
        /// Path to ground truth annotations JSON file
        #[arg(long, env = "COCO_GT")]
        gt: PathBuf,

        /// Filter to specific image IDs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        img_ids: Vec<u64>,

        /// Filter to specific category IDs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        cat_ids: Vec<u64>,

        /// Keep annotations with lo < area < hi (e.g. "0,1024")
        #[arg(long, value_delimiter = ',')]
        area_rng: Option<Vec<f64>>,

        /// Keep only crowd (true) or non-crowd (false) annotations
        #[arg(long)]
        iscrowd: Option<bool>,
    },

    /// Print category IDs matching the given filters, one per line
    CatIds {
        /// Path to ground truth annotations JSON file
        #[arg(long, env = "COCO_GT")]
        gt: PathBuf,

        /// Category names (comma-separated)
        #[arg(long, value_delimiter = ',')]
        names: Vec<String>,

        /// Supercategory names (comma-separated)
        #[arg(long, value_delimiter = ',')]
        supercategories: Vec<String>,

        /// Category IDs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        ids: Vec<u64>,
    },

    /// Normalize a detection results file against a ground truth file
    LoadRes {
        /// Path to ground truth annotations JSON file
        #[arg(long, env = "COCO_GT")]
        gt: PathBuf,

        /// Path to detection results JSON file
        #[arg(long)]
        res: PathBuf,

        /// Where to write the merged dataset (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Info { gt } => {
            let coco = COCO::new(&gt)?;
            println!("images: {}", coco.dataset().images().len());
            println!("annotations: {}", coco.dataset().annotations().len());
            println!("categories: {}", coco.dataset().categories().len());
            println!(
                "annotated images: {}",
                coco.get_img_ids(&[], &[])
                    .iter()
                    .filter(|&&id| coco.anns_for_img(id).next().is_some())
                    .count()
            );
        }
        Command::AnnIds {
            gt,
            img_ids,
            cat_ids,
            area_rng,
            iscrowd,
        } => {
            let area_rng = match area_rng.as_deref() {
                None => None,
                Some(&[lo, hi]) => Some([lo, hi]),
                Some(other) => {
                    return Err(format!("--area-rng takes two bounds, got {}", other.len()).into())
                }
            };
            let coco = COCO::new(&gt)?;
            print_ids(&coco.get_ann_ids(&img_ids, &cat_ids, area_rng, iscrowd))?;
        }
        Command::CatIds {
            gt,
            names,
            supercategories,
            ids,
        } => {
            let coco = COCO::new(&gt)?;
            let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let sups: Vec<&str> = supercategories.iter().map(|s| s.as_str()).collect();
            print_ids(&coco.get_cat_ids(&names, &sups, &ids))?;
        }
        Command::LoadRes { gt, res, out } => {
            let coco_gt = COCO::new(&gt)?;
            let coco_dt = coco_gt.load_res(&res)?;
            log::info!(
                "normalized {} result annotations",
                coco_dt.dataset().annotations().len()
            );
            match out {
                Some(path) => coco_dt.write_json(&path)?,
                None => {
                    let stdout = std::io::stdout();
                    let mut lock = stdout.lock();
                    serde_json::to_writer(&mut lock, coco_dt.dataset())?;
                    writeln!(lock)?;
                }
            }
        }
    }

    Ok(())
}

fn print_ids(ids: &[u64]) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    for id in ids {
        writeln!(lock, "{}", id)?;
    }
    Ok(())
}
