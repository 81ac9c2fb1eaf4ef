// Plan command: show what `push` would do without running the tool

use anyhow::Result;
use serde::Serialize;

use crate::config::SeedConfig;
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use crate::reference::ImageReference;

#[derive(Debug, Serialize)]
struct PlanEntry {
    namespace: String,
    reference: ImageReference,
}

#[derive(Debug, Serialize)]
struct Plan {
    source_image: String,
    tool: String,
    concurrency: usize,
    references: Vec<PlanEntry>,
    total: usize,
}

fn build(config: &SeedConfig) -> Plan {
    let references: Vec<PlanEntry> = config
        .namespaces
        .iter()
        .flat_map(|namespace| {
            config
                .references(namespace)
                .into_iter()
                .map(|reference| PlanEntry {
                    namespace: namespace.clone(),
                    reference,
                })
        })
        .collect();

    Plan {
        source_image: config.source_image.clone(),
        tool: config.tool.clone(),
        concurrency: config.concurrency,
        total: references.len(),
        references,
    }
}

pub fn run(config: &SeedConfig, output: OutputFormat) -> Result<()> {
    let plan = build(config);

    if !output.is_text() {
        return output.print_value(&plan);
    }

    print_field("Source image", &plan.source_image);
    print_field("Tool", &plan.tool);
    print_field("Concurrency", &plan.concurrency.to_string());
    println!();

    print_table_header(&[("NAMESPACE", 20), ("REFERENCE", 60)]);
    for entry in &plan.references {
        let reference = entry.reference.to_string();
        print_table_row(&[(&entry.namespace, 20), (&reference, 60)]);
    }

    println!();
    println!("{} references to tag and push", plan.total);

    Ok(())
}
