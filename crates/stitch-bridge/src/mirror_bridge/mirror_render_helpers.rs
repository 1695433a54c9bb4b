use stitch_github::{RepoName, TrackedItem};

/// Human-facing label for an item kind, used in messages and log lines.
pub(super) fn item_kind_label(is_pull_request: bool) -> &'static str {
    if is_pull_request {
        "Pull Request"
    } else {
        "Issue"
    }
}

/// Starter message posted when a mirror thread is created.
pub(super) fn thread_opening_message(repo: &RepoName, item: &TrackedItem) -> String {
    format!(
        "**New {} in {}:** {}",
        item_kind_label(item.is_pull_request),
        repo.as_slug(),
        item.html_url
    )
}

/// Notice posted into a thread right before it is locked.
pub(super) fn closure_notice(is_pull_request: bool) -> String {
    format!(
        "The {} has been closed or merged. This thread will now be locked.",
        item_kind_label(is_pull_request)
    )
}
