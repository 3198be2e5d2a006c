use archivist_core::analysis::resolve::{
    apply_merge, as_letter, distinct_file_names, parse_input, plan_merge, sort_group,
    ResolverInput,
};
use archivist_core::storage::{Database, StorageRecord};
use archivist_core::Reporter;
use chrono::DateTime;
use colored::*;
use console::Term;
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

const DEFAULT_LOOKAHEAD: usize = 5;

pub enum Resolution {
    Finished,
    Quit,
}

fn print_group(group: &[StorageRecord], marker: &str) {
    for (i, record) in group.iter().enumerate() {
        let modified = DateTime::from_timestamp(record.modified_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{}No. {:>2}: {}  {:>12} bytes  {}",
            marker,
            i,
            record.relative_path().bold(),
            record.size,
            modified.dimmed()
        );
    }
}

/// Walk the operator through every group, one at a time, on the volume mounted at `root`.
pub fn resolve_groups(
    db: &Database,
    root: &Path,
    mut groups: Vec<Vec<StorageRecord>>,
    reporter: &dyn Reporter,
) -> anyhow::Result<Resolution> {
    for group in groups.iter_mut() {
        sort_group(group);
    }

    let term = Term::stdout();
    let mut lookahead = DEFAULT_LOOKAHEAD;
    for index in 0..groups.len() {
        let group = &groups[index];
        let file_names = distinct_file_names(group);
        let mut selected_name: Option<usize> = None;

        loop {
            if index > 0 {
                print_group(&groups[index - 1], "     ");
                println!();
            }
            print_group(group, " >>> ");
            if file_names.len() > 1 {
                println!(" >>> Available filenames:");
                for (i, name) in file_names.iter().enumerate() {
                    let mark = if selected_name == Some(i) { "!" } else { " " };
                    println!(" >>> {}Filename {}: {}", mark, as_letter(i), name);
                }
            }
            for upcoming in groups.iter().skip(index + 1).take(lookahead) {
                println!();
                print_group(upcoming, "     ");
            }

            println!();
            println!(
                " [group {}/{}, {} to go]",
                index + 1,
                groups.len(),
                groups.len() - index
            );
            println!();
            println!("Enter number of file to keep, lowercase letter for target filename, nothing to skip, Q to quit, +/- to show more/less groups.");
            print!(" > ");
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            match parse_input(&input, group.len(), file_names.len()) {
                ResolverInput::Skip => {
                    term.clear_screen()?;
                    break;
                }
                ResolverInput::Quit => return Ok(Resolution::Quit),
                ResolverInput::ShowMore => lookahead += 1,
                ResolverInput::ShowLess => lookahead = lookahead.saturating_sub(1),
                ResolverInput::SelectFileName(i) => selected_name = Some(i),
                ResolverInput::Keep(keep) => {
                    term.clear_screen()?;
                    let target = selected_name.map(|i| file_names[i].as_str());
                    match plan_merge(root, group, keep, target) {
                        Ok(plan) => {
                            apply_merge(db, &plan, reporter)?;
                        }
                        Err(err) => warn!("{}", err),
                    }
                    break;
                }
                ResolverInput::Unrecognized => {}
            }
            term.clear_screen()?;
        }
    }
    Ok(Resolution::Finished)
}

pub fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
