// Colored terminal output for filter results and topic listings.
//
// main.rs delegates all human-facing formatting here; the filtered JSON goes
// to stdout or a file separately.

use colored::Colorize;

use crate::articles::Item;
use crate::filter::FilterStats;
use crate::topics::TopicDefinition;

/// Display the surfaced items grouped in output order, with their peers.
pub fn display_filtered(items: &[Item]) {
    if items.is_empty() {
        println!("No items passed the filter.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Filtered Items ({}) ===", items.len()).bold()
    );

    let mut current: Option<&str> = None;
    for item in items {
        let category = item.category.as_deref().unwrap_or("?");
        if current != Some(category) {
            println!("\n  {}", category.cyan().bold());
            current = Some(category);
        }

        let score = item.prefilter_score.unwrap_or(0.0);
        let title = if item.title.is_empty() {
            item.url.as_str()
        } else {
            item.title.as_str()
        };
        println!(
            "    {}  {}",
            colorize_score(score),
            super::truncate_chars(title, 90)
        );

        for peer in item.other_urls.iter().flatten() {
            println!(
                "          {} {} {}",
                "+".dimmed(),
                format!("{:.4}", peer.distance).dimmed(),
                super::truncate_chars(&peer.url, 100).dimmed()
            );
        }
    }
    println!();
}

/// Display the run summary.
pub fn display_stats(stats: &FilterStats) {
    if stats.degraded {
        println!(
            "  {} Filtering failed; all {} items passed through unfiltered (see log)",
            "!!".red().bold(),
            stats.input
        );
        return;
    }

    println!(
        "  {} in, {} below threshold, {} clusters, {} folded, {} capped, {} out",
        stats.input,
        stats.rejected.to_string().yellow(),
        stats.clusters,
        stats.deduplicated,
        stats.capped.to_string().yellow(),
        stats.retained.to_string().green().bold(),
    );
}

/// Display configured topics and the strings embedded for each.
pub fn display_topics(topics: &[TopicDefinition]) {
    if topics.is_empty() {
        println!("No topics configured.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Topics ({}) ===", topics.len()).bold()
    );
    for (i, topic) in topics.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, topic.name.bold());
        if !topic.keywords.is_empty() {
            println!("       {}", topic.keywords.join(", ").dimmed());
        }
        for query in &topic.queries {
            println!("       > {}", query.dimmed());
        }
    }
    println!();
}

/// Colorize a similarity score by strength.
fn colorize_score(score: f64) -> colored::ColoredString {
    let text = format!("{score:.3}");
    if score >= 0.8 {
        text.green().bold()
    } else if score >= 0.6 {
        text.green()
    } else if score >= 0.4 {
        text.yellow()
    } else {
        text.dimmed()
    }
}
