use clap::{Parser, Subcommand};

/// Operations CLI for the Hearth family organizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the generation sweep over all active auto-scheduled series
    Sweep(SweepCommand),
    /// Preview upcoming occurrences of a series without materializing them
    Preview(PreviewCommand),
    /// Exclude one occurrence date from a series
    Skip(SkipCommand),
    /// Remove a previously recorded skip
    Unskip(UnskipCommand),
    /// Pause a series; the sweep leaves it alone until resumed
    Pause(PauseCommand),
    /// Resume a paused series
    Resume(ResumeCommand),
    /// Inspect recurring series
    Series(SeriesCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct SweepCommand {
    /// Reference date for the sweep (YYYY-MM-DD, defaults to today)
    #[clap(long)]
    pub as_of: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct PreviewCommand {
    /// The series ID
    pub id: String,
    /// First date of the preview (YYYY-MM-DD, defaults to today)
    #[clap(long)]
    pub from: Option<String>,
    /// Number of occurrences to show
    #[clap(short, long, default_value_t = 5)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct SkipCommand {
    /// The series ID
    pub id: String,
    /// The occurrence date to exclude (YYYY-MM-DD)
    pub date: String,
    /// Optional reason recorded with the skip
    #[clap(short, long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct UnskipCommand {
    /// The series ID
    pub id: String,
    /// The skipped date to restore (YYYY-MM-DD)
    pub date: String,
}

#[derive(Parser, Debug, Clone)]
pub struct PauseCommand {
    /// The series ID
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ResumeCommand {
    /// The series ID
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SeriesCommand {
    #[command(subcommand)]
    pub command: SeriesSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SeriesSubcommand {
    /// List all recurring series
    List,
    /// Show one series in detail, including its skips
    Show(SeriesShowCommand),
    /// Generate due occurrences for one series on demand
    Generate(SeriesGenerateCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct SeriesShowCommand {
    /// The series ID
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SeriesGenerateCommand {
    /// The series ID
    pub id: String,
    /// Generate through this date (YYYY-MM-DD, defaults to today + lookahead)
    #[clap(long)]
    pub through: Option<String>,
}
