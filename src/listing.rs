//! Human-readable rendering of metadata-factory views: plain space/newline
//! separated lists, and a tool "long listing" table that narrows to three
//! columns on narrow terminals.

use owo_colors::OwoColorize;

use crate::{metadata::Versions, updates::Updates};

const LONG_LISTING_WIDTH: usize = 95;

pub fn print_versions(versions: &Versions) {
    let line = versions
        .flat()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    println!("{line}");
}

pub fn print_plain_list(items: &[String]) {
    println!("{}", items.join(" "));
}

pub fn print_tool_folder_names(items: &[String]) {
    for item in items {
        println!("{item}");
    }
}

/// Renders tool variants as a table. Falls back to a narrower 3-column form
/// (name, version, release date) when `terminal_width` is below 95 columns
/// or there is no tty (`terminal_width == None`).
pub fn print_tool_long_listing(updates: &Updates, terminal_width: Option<usize>) {
    let wide = terminal_width.is_some_and(|w| w >= LONG_LISTING_WIDTH);

    if wide {
        println!(
            "{:<30} {:<12} {:<14} {:<30} {}",
            "Tool Variant Name".bold(),
            "Version".bold(),
            "Release Date".bold(),
            "Display Name".bold(),
            "Description".bold()
        );
        for pkg in updates.iter() {
            println!(
                "{:<30} {:<12} {:<14} {:<30} {}",
                pkg.name, pkg.full_version, pkg.release_date, pkg.display_name, pkg.description
            );
        }
    } else {
        println!(
            "{:<30} {:<12} {}",
            "Tool Variant Name".bold(),
            "Version".bold(),
            "Release Date".bold()
        );
        for pkg in updates.iter() {
            println!("{:<30} {:<12} {}", pkg.name, pkg.full_version, pkg.release_date);
        }
    }
}
