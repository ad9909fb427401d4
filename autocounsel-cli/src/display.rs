use autocounsel::{FieldAction, FieldValue, OutcomeAggregator, RecordRow};
use colored::*;

/// The aggregator's text summary, with status lines colored.
pub fn print_summary(outcomes: &OutcomeAggregator) {
    println!();
    for line in outcomes.render_summary().lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("Success:") {
            println!("{}", line.green().bold());
        } else if trimmed.starts_with("Failed:") || trimmed.starts_with('✗') {
            println!("{}", line.red());
        } else if trimmed.starts_with("Error:") || trimmed.starts_with('!') {
            println!("{}", line.yellow());
        } else {
            println!("{line}");
        }
    }
}

fn describe_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => format!("\"{text}\""),
        FieldValue::SelectLabel(label) => format!("select \"{label}\""),
        FieldValue::Choice(code) => format!("choose {code}"),
        FieldValue::Toggle(true) => "toggle on".to_string(),
        FieldValue::Toggle(false) => "leave default".to_string(),
    }
}

pub fn print_row_check(row: &RecordRow, actions: Option<&[FieldAction]>) {
    let label = format!("[{}] {}({})", row.index, row.student_name, row.student_id);
    match (&row.record, actions) {
        (Err(e), _) => println!("{} {label}: {e}", "✗".red().bold()),
        (Ok(_), Some(actions)) => {
            println!("{} {label}", "✓".green().bold());
            for action in actions {
                println!(
                    "    {:<8} {}",
                    action.target.to_string().cyan(),
                    describe_value(&action.value)
                );
            }
        }
        (Ok(_), None) => println!("{} {label}", "✓".green().bold()),
    }
}
