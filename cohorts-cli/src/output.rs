//! Human-readable tables for command results.

use cohorts_core::StratificationResponse;
use cohorts_daily::{CampaignReport, RunReport};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

fn p_value_cell(p_value: Option<f64>, threshold: Option<f64>) -> Cell {
    match p_value {
        None => Cell::new("-"),
        Some(p) => {
            let cell = Cell::new(format!("{p:.4}"));
            match threshold {
                Some(min) if p < min => cell.fg(Color::Red),
                _ => cell,
            }
        }
    }
}

pub fn print_stratification(response: &StratificationResponse) {
    let threshold = response.iteration_info.as_ref().map(|i| i.target_p_value);

    let mut groups = table(&["Group", "Type", "Rows", "Proportion", "Requested", "Min p-value"]);
    for group in &response.groups {
        let min_p = group
            .balance
            .iter()
            .map(|b| b.p_value)
            .min_by(|a, b| a.total_cmp(b));
        groups.add_row(vec![
            Cell::new(group.ordinal),
            Cell::new(group.kind),
            Cell::new(group.row_count),
            Cell::new(format!("{:.4}", group.proportion)),
            Cell::new(
                group
                    .requested_proportion
                    .map(|p| format!("{p:.4}"))
                    .unwrap_or_else(|| "-".into()),
            ),
            p_value_cell(min_p, threshold),
        ]);
    }
    println!("{groups}");

    println!(
        "Split: {} into {} groups on [{}]",
        response.split_method.as_str(),
        response.n_splits,
        response.stratify_columns.join(", ")
    );
    println!(
        "Rows: {} in pool, {} assigned, {} excluded",
        response.total_rows,
        response.assigned_rows(),
        response.excluded_records
    );
    if let Some(test_set) = &response.test_set {
        println!("Held out: {} rows", test_set.row_count);
    }
    if !response.dropped_strata.is_empty() {
        let dropped: Vec<String> = response
            .dropped_strata
            .iter()
            .map(|d| format!("{} ({})", d.key, d.count))
            .collect();
        println!("Dropped strata: {}", dropped.join(", "));
    }
    if response.memory_info.memory_efficient_processing {
        println!(
            "Sampled {} rows and extrapolated; {} rows unassigned",
            response.memory_info.sample_rows.unwrap_or_default(),
            response.memory_info.unassigned_rows
        );
    }
    if let Some(info) = &response.iteration_info {
        let verdict = if info.criteria_met { "met" } else { "not met" };
        println!(
            "Validator: {} of {} iterations, target p >= {} {}",
            info.iterations_performed, info.max_iterations, info.target_p_value, verdict
        );
    }
}

pub fn print_campaign_report(report: &CampaignReport) {
    let mut groups = table(&["Sub-group", "Type", "Allocated", "Primary", "Mirror", "Status"]);
    for group in &report.groups {
        let Some(outcome) = &group.outcome else {
            groups.add_row(vec![
                Cell::new(&group.sub_id),
                Cell::new(group.kind),
                Cell::new(group.allocated),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("planned").fg(Color::Cyan),
            ]);
            continue;
        };
        let mirror = match &outcome.secondary {
            Some(secondary) if secondary.success => Cell::new(secondary.inserted_count),
            Some(secondary) => Cell::new(format!(
                "{} ({})",
                secondary.inserted_count,
                secondary.error.as_deref().unwrap_or("failed")
            ))
            .fg(Color::Yellow),
            None => Cell::new("-"),
        };
        let status = if outcome.success {
            Cell::new("ok").fg(Color::Green)
        } else {
            Cell::new("failed").fg(Color::Red)
        };
        groups.add_row(vec![
            Cell::new(&group.sub_id),
            Cell::new(group.kind),
            Cell::new(group.allocated),
            Cell::new(outcome.primary.inserted_count),
            mirror,
            status,
        ]);
    }

    println!("{} {}", report.base_id, report.name);
    if report.skipped_no_groups {
        println!("  skipped: campaign has no groups ({} allocated)", report.allocated);
    } else if let Some(error) = &report.error {
        println!("  error: {error}");
    } else {
        println!("{groups}");
    }
}

pub fn print_run_report(report: &RunReport) {
    if report.dry_run {
        println!("Dry run {} for {} (nothing written)", report.run_id, report.run_date);
    } else {
        println!("Run {} for {}", report.run_id, report.run_date);
    }
    println!("Status: {:?} (stage {})", report.status, report.stage.as_str());
    if let Some(reason) = report.skip_reason {
        println!("Skipped: {}", reason.as_str());
    }
    if let Some(message) = &report.error_message {
        println!("Error: {message}");
    }
    println!(
        "Campaigns: {}  Candidates: {} ({} duplicates, {} blanks dropped)  Distributed: {}",
        report.campaigns_found,
        report.candidates_found,
        report.duplicates_dropped,
        report.blanks_dropped,
        report.users_distributed
    );
    for campaign in &report.campaigns {
        print_campaign_report(campaign);
    }
}
