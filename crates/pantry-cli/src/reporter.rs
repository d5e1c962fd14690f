//! Terminal rendering. Library crates never print; this is the one place
//! allowed to, per the ambient logging design.

use console::style;

pub trait Reporter {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

pub struct CliReporter;

impl Reporter for CliReporter {
    fn info(&self, msg: &str) {
        println!("{} {msg}", style("info").green().bold());
    }

    fn warn(&self, msg: &str) {
        eprintln!("{} {msg}", style("warn").yellow().bold());
    }

    fn error(&self, msg: &str) {
        eprintln!("{} {msg}", style("error").red().bold());
    }
}
