//! Debounced batching of new-message summaries.
//!
//! Every monitored connection feeds the same [`Aggregator`]. A burst of new
//! mail arrives as a rapid run of FETCH literals; instead of one notification
//! per message, summaries collect in a [`NotificationBatch`] and a single
//! [`Notification`] is produced once no new summary has arrived for the
//! debounce window.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::MonitorConfig;
use crate::timer::Timer;
use crate::types::MessageSummary;

/// Summaries collected since the last flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationBatch {
    summaries: Vec<MessageSummary>,
    total: u32,
}

impl NotificationBatch {
    /// Buffered summaries, in arrival order.
    #[must_use]
    pub fn summaries(&self) -> &[MessageSummary] {
        &self.summaries
    }

    /// Number of summaries added, including those beyond the buffer cap.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Returns true if nothing has been added.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// A batched notification ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Total number of new messages in the batch.
    pub count: u32,
    /// Title line, e.g. `3 new messages`.
    pub title: String,
    /// Markup body, one line per buffered summary.
    pub body: String,
    /// The buffered summaries the body was built from.
    pub summaries: Vec<MessageSummary>,
}

impl Notification {
    /// Builds the display text for a flushed batch.
    #[must_use]
    pub fn from_batch(batch: NotificationBatch) -> Self {
        let title = if batch.total == 1 {
            "1 new message".to_string()
        } else {
            format!("{} new messages", batch.total)
        };

        let body = batch
            .summaries
            .iter()
            .map(|summary| {
                format!(
                    "<b>{}</b>  {}",
                    escape_markup(summary.subject.as_deref().unwrap_or_default()),
                    escape_markup(summary.from.as_deref().unwrap_or_default()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            count: batch.total,
            title,
            body,
            summaries: batch.summaries,
        }
    }
}

/// Process-wide summary aggregator with a debounce timer.
#[derive(Debug, Clone)]
pub struct Aggregator {
    batch: NotificationBatch,
    timer: Timer,
    debounce: Duration,
    max_summaries: usize,
}

impl Aggregator {
    /// Creates an aggregator with the given debounce window and buffer cap.
    #[must_use]
    pub const fn new(debounce: Duration, max_summaries: usize) -> Self {
        Self {
            batch: NotificationBatch {
                summaries: Vec::new(),
                total: 0,
            },
            timer: Timer::new(),
            debounce,
            max_summaries,
        }
    }

    /// Creates an aggregator from monitor configuration.
    #[must_use]
    pub const fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.debounce, config.max_summaries)
    }

    /// Adds a summary and restarts the debounce window.
    ///
    /// Only the first `max_summaries` summaries of a batch are kept; the total
    /// count always increments.
    pub fn add(&mut self, summary: MessageSummary, now: Instant) {
        if self.batch.summaries.len() < self.max_summaries {
            self.batch.summaries.push(summary);
        }
        self.batch.total = self.batch.total.saturating_add(1);
        self.timer.arm_once(now, self.debounce);

        tracing::trace!(
            total = self.batch.total,
            buffered = self.batch.summaries.len(),
            "summary queued"
        );
    }

    /// The batch collected so far.
    #[must_use]
    pub const fn batch(&self) -> &NotificationBatch {
        &self.batch
    }

    /// When the pending batch will flush, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Flushes the batch if the debounce window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Notification> {
        if !self.timer.fire(now) {
            return None;
        }
        let batch = std::mem::take(&mut self.batch);
        if batch.is_empty() {
            return None;
        }
        Some(Notification::from_batch(batch))
    }

    /// Drops any pending batch without displaying it.
    ///
    /// Returns the number of messages that were pending.
    pub fn discard(&mut self) -> u32 {
        self.timer.cancel();
        let discarded = std::mem::take(&mut self.batch).total;
        if discarded > 0 {
            tracing::debug!(count = discarded, "discarding pending notification");
        }
        discarded
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Escapes text for inclusion in notification markup.
#[must_use]
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the new-mail command template for `count` messages.
///
/// A template with exactly one `%d` has it replaced by the count; any other
/// template is returned unchanged.
#[must_use]
pub fn render_command(template: &str, count: u32) -> String {
    if template.matches("%d").count() == 1 {
        template.replacen("%d", &count.to_string(), 1)
    } else {
        template.to_string()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn aggregator() -> Aggregator {
        Aggregator::new(80 * MS, 5)
    }

    fn summary(n: u32) -> MessageSummary {
        MessageSummary::with(format!("Subject {n}"), format!("sender{n}@example.com"))
    }

    #[test]
    fn test_empty_aggregator_never_flushes() {
        let mut agg = aggregator();
        let start = Instant::now();
        assert_eq!(agg.deadline(), None);
        assert_eq!(agg.poll(start + 1000 * MS), None);
    }

    #[test]
    fn test_cap_at_five_with_total_seven() {
        let mut agg = aggregator();
        let start = Instant::now();
        for n in 0..7 {
            agg.add(summary(n), start + n * 5 * MS);
        }

        assert_eq!(agg.batch().summaries().len(), 5);
        assert_eq!(agg.batch().total(), 7);

        let notification = agg.poll(start + 200 * MS).unwrap();
        assert_eq!(notification.count, 7);
        assert_eq!(notification.summaries.len(), 5);
        assert_eq!(notification.summaries[0], summary(0));
        assert_eq!(notification.summaries[4], summary(4));
        assert_eq!(notification.title, "7 new messages");
        assert_eq!(notification.body.lines().count(), 5);
    }

    #[test]
    fn test_debounce_single_flush() {
        let mut agg = aggregator();
        let start = Instant::now();

        agg.add(summary(0), start);
        assert_eq!(agg.poll(start + 30 * MS), None);
        agg.add(summary(1), start + 30 * MS);
        assert_eq!(agg.poll(start + 60 * MS), None);
        agg.add(summary(2), start + 60 * MS);

        assert_eq!(agg.poll(start + 139 * MS), None);
        assert_eq!(agg.deadline(), Some(start + 140 * MS));

        let notification = agg.poll(start + 140 * MS).unwrap();
        assert_eq!(notification.count, 3);

        assert_eq!(agg.poll(start + 300 * MS), None);
        assert!(agg.batch().is_empty());
    }

    #[test]
    fn test_batch_resets_after_flush() {
        let mut agg = aggregator();
        let start = Instant::now();

        agg.add(summary(0), start);
        agg.poll(start + 80 * MS).unwrap();

        agg.add(summary(1), start + 500 * MS);
        let notification = agg.poll(start + 580 * MS).unwrap();
        assert_eq!(notification.count, 1);
        assert_eq!(notification.title, "1 new message");
    }

    #[test]
    fn test_discard() {
        let mut agg = aggregator();
        let start = Instant::now();
        agg.add(summary(0), start);
        agg.add(summary(1), start);

        assert_eq!(agg.discard(), 2);
        assert_eq!(agg.deadline(), None);
        assert_eq!(agg.poll(start + 1000 * MS), None);
    }

    #[test]
    fn test_body_is_escaped() {
        let mut agg = aggregator();
        let start = Instant::now();
        agg.add(
            MessageSummary::with("Tom & Jerry <3", "\"Bob\" <bob@example.com>"),
            start,
        );

        let notification = agg.poll(start + 80 * MS).unwrap();
        assert_eq!(
            notification.body,
            "<b>Tom &amp; Jerry &lt;3</b>  &quot;Bob&quot; &lt;bob@example.com&gt;"
        );
    }

    #[test]
    fn test_incomplete_summary_renders_empty_fields() {
        let mut agg = aggregator();
        let start = Instant::now();
        let mut partial = MessageSummary::new();
        partial.subject = Some("Only a subject".to_string());
        agg.add(partial, start);

        let notification = agg.poll(start + 80 * MS).unwrap();
        assert_eq!(notification.body, "<b>Only a subject</b>  ");
    }

    #[test]
    fn test_render_command() {
        assert_eq!(render_command("notify-send %d", 4), "notify-send 4");
        assert_eq!(render_command("beep", 4), "beep");
        assert_eq!(render_command("echo %d %d", 4), "echo %d %d");
    }

    #[test]
    fn test_escape_markup_plain() {
        assert_eq!(escape_markup("plain text"), "plain text");
        assert_eq!(escape_markup("it's"), "it&apos;s");
    }
}
