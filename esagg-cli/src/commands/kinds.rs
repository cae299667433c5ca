use anyhow::Result;
use esagg::registry::{AggregationKindSpec, FieldRequirement, Nesting};
use esagg::{registry, Category};

fn field_column(spec: &AggregationKindSpec) -> String {
    match spec.field {
        FieldRequirement::None => "-".to_string(),
        FieldRequirement::Optional(filter) => format!("{}?", filter.describe()),
        FieldRequirement::Required(filter) => filter.describe().to_string(),
    }
}

fn nesting_column(nesting: Nesting) -> &'static str {
    match nesting {
        Nesting::Forbidden => "no",
        Nesting::Merged => "merged",
        Nesting::Discarded => "discarded",
    }
}

/// Run kinds command
pub fn run_kinds(category: Option<&str>) -> Result<()> {
    let category = category
        .map(str::parse::<Category>)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let registry = registry();
    println!("{:<28} {:<14} {:<18} sub-aggs", "kind", "category", "field");
    println!("--------------------------------------------------------------------------------");
    let mut shown = 0;
    for spec in registry.iter() {
        if category.is_some_and(|c| c != spec.category) {
            continue;
        }
        println!(
            "{:<28} {:<14} {:<18} {}",
            spec.kind.as_str(),
            spec.category.as_str(),
            field_column(spec),
            nesting_column(spec.nesting)
        );
        shown += 1;
    }
    println!();
    println!("{} of {} kinds", shown, registry.len());
    Ok(())
}
