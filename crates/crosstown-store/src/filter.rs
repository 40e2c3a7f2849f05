//! Pure `matches(filter, event)` predicate. No I/O, no allocation
//! beyond what hex-prefix comparisons need.

use crosstown_types::{Filter, SignedEvent};

/// An entirely empty filter matches every event. Otherwise every non-empty
/// field must match (fields are AND'd within one filter; callers OR multiple
/// filters together — see `crosstown_store::query`).
pub fn matches(filter: &Filter, event: &SignedEvent) -> bool {
    if filter.is_empty() {
        return true;
    }

    if !filter.ids.is_empty() && !filter.ids.iter().any(|prefix| hex_prefix_matches(prefix, &event.id)) {
        return false;
    }

    if !filter.authors.is_empty()
        && !filter.authors.iter().any(|prefix| hex_prefix_matches(prefix, &event.pubkey))
    {
        return false;
    }

    if !filter.kinds.is_empty() && !filter.kinds.contains(&event.kind) {
        return false;
    }

    if let Some(since) = filter.since {
        if event.created_at < since {
            return false;
        }
    }

    if let Some(until) = filter.until {
        if event.created_at > until {
            return false;
        }
    }

    for (tag_name, allowed) in &filter.tags {
        if !tag_matches(tag_name, allowed, event) {
            return false;
        }
    }

    true
}

/// Case-insensitive hex-prefix match; `prefix` matches exactly when it is 64
/// characters, otherwise it is treated as a prefix of `full`.
fn hex_prefix_matches(prefix: &str, full: &str) -> bool {
    let prefix = prefix.to_ascii_lowercase();
    let full = full.to_ascii_lowercase();
    full.starts_with(&prefix)
}

/// `tag_name` is the single character following `#` in the wire filter
/// (`Filter::tags` keys). Matches iff the event has at least one tag row
/// whose name equals `tag_name` and whose second element is in `allowed`.
fn tag_matches(tag_name: &str, allowed: &std::collections::HashSet<String>, event: &SignedEvent) -> bool {
    event.tags.iter().any(|row| {
        row.first().map(|name| name == tag_name).unwrap_or(false)
            && row.get(1).map(|value| allowed.contains(value)).unwrap_or(false)
    })
}
