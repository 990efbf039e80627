//! Progress bar for apply and destroy.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use modgraph::{CreatedResource, ProgressCallback};

/// Module-level progress bar fed by the graph executor
pub struct BarProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl BarProgress {
    /// A bar over `modules` steps; hidden when `quiet`
    pub fn new(modules: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(modules as u64)
        };
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar, quiet }
    }

    /// Clear the bar, leaving the per-module lines in place
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn line(&self, module: &str, detail: &str) {
        if !self.quiet {
            self.bar
                .suspend(|| println!("  {} {} {}", "✓".green(), module, detail.dimmed()));
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_module_start(&mut self, module: &str, kind: &str, resources: usize) {
        log::debug!("{module}: rendering {resources} resources ({kind})");
        self.bar.set_message(format!("{module} ({kind})"));
    }

    fn on_resource(&mut self, module: &str, resource: &CreatedResource) {
        log::info!("{module}: {} {} -> {}", resource.kind, resource.name, resource.id);
        self.bar.set_message(format!("{module}: {} {}", resource.kind, resource.name));
    }

    fn on_resource_deleted(&mut self, module: &str, resource: &CreatedResource) {
        log::info!("{module}: deleted {} {}", resource.kind, resource.id);
        self.bar.set_message(format!("{module}: deleting {} {}", resource.kind, resource.name));
    }

    fn on_module_complete(&mut self, module: &str) {
        self.bar.inc(1);
        self.line(module, "done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgraph::ResourceKind;
    use std::collections::BTreeMap;

    #[test]
    fn test_hidden_bar_advances_per_module() {
        let mut progress = BarProgress::new(1, true);
        let resource = CreatedResource {
            id: "vpc-1".to_string(),
            kind: ResourceKind::Network,
            name: "vpc".to_string(),
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        progress.on_module_start("networking", "networking", 1);
        progress.on_resource("networking", &resource);
        progress.on_module_complete("networking");
        assert_eq!(progress.bar.position(), 1);
        progress.finish();
    }
}
