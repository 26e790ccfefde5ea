//! Command-line parsing for the `pricewatch` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pages walked by `browse` when `--pages` is absent.
pub const DEFAULT_BROWSE_PAGES: u32 = 1;

/// Browse cached marketplace listings and item price history
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "pricewatch")]
#[command(version, about, long_about = None)]
pub struct Invocation {
    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show an item and its price history
    Item {
        /// Product URL or numeric item ID
        input: String,
    },

    /// List top-level categories
    Categories,

    /// List the children of a category
    Subcategories { parent: String },

    /// Walk the item listing of a subcategory
    Browse {
        subcategory: String,

        /// Number of pages to walk
        #[arg(long, default_value_t = DEFAULT_BROWSE_PAGES, value_parser = clap::value_parser!(u32).range(1..))]
        pages: u32,
    },
}
