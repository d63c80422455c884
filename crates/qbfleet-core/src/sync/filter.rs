//! Pure in-memory filter / sort / paginate helpers shared by the Sync
//! Manager and the Cross-Instance Aggregator (SPEC_FULL.md §4.3.3).

use crate::model::{FilterSpec, SortDirection, SortField, SortKey, StatusKey, TorrentView};

/// Apply `filter` to `torrents`, returning the matching subset in order.
#[must_use]
pub fn apply_filter<'a>(torrents: &'a [TorrentView], filter: &FilterSpec) -> Vec<&'a TorrentView> {
    torrents.iter().filter(|t| matches_filter(t, filter)).collect()
}

fn matches_filter(torrent: &TorrentView, filter: &FilterSpec) -> bool {
    if let Some(search) = &filter.search {
        if !search.is_empty() && !matches_search(torrent, search) {
            return false;
        }
    }
    if !filter.status.is_empty() && !any_status_matches(torrent, &filter.status) {
        return false;
    }
    if !filter.categories.is_empty() && !filter.categories.iter().any(|c| c == &torrent.category) {
        return false;
    }
    if !filter.tags.is_empty() && !filter.tags.iter().any(|t| torrent.tags.contains(t)) {
        return false;
    }
    if !filter.trackers.is_empty() && !filter.trackers.iter().any(|h| h == &torrent.tracker_host) {
        return false;
    }
    if any_status_matches(torrent, &filter.exclude_status) {
        return false;
    }
    if filter.exclude_categories.iter().any(|c| c == &torrent.category) {
        return false;
    }
    if filter.exclude_tags.iter().any(|t| torrent.tags.contains(t)) {
        return false;
    }
    if filter.exclude_trackers.iter().any(|h| h == &torrent.tracker_host) {
        return false;
    }
    true
}

fn any_status_matches(torrent: &TorrentView, keys: &[String]) -> bool {
    keys.iter()
        .filter_map(|raw| StatusKey::parse(raw))
        .any(|key| key.matches(torrent))
}

fn matches_search(torrent: &TorrentView, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let joined_tags = torrent.tags.join(",");
    [
        torrent.name.as_str(),
        torrent.category.as_str(),
        joined_tags.as_str(),
        torrent.save_path.as_str(),
        torrent.tracker_host.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
}

/// Sort `torrents` by `keys`, appending `(addedOn desc, infohash asc)` as a
/// stable tiebreaker so every sort establishes a total order.
pub fn apply_sort(torrents: &mut [&TorrentView], keys: &[SortKey]) {
    torrents.sort_by(|a, b| {
        for key in keys {
            let ordering = compare_field(a, b, key.field);
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        b.added_on.cmp(&a.added_on).then_with(|| a.infohash.cmp(&b.infohash))
    });
}

fn compare_field(a: &TorrentView, b: &TorrentView, field: SortField) -> std::cmp::Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Size => a.size.cmp(&b.size),
        SortField::Progress => a.progress.total_cmp(&b.progress),
        SortField::State => a.state.cmp(&b.state),
        SortField::Ratio => a.ratio.total_cmp(&b.ratio),
        SortField::AddedOn => a.added_on.cmp(&b.added_on),
        SortField::DownloadSpeed => a.download_speed.cmp(&b.download_speed),
        SortField::UploadSpeed => a.upload_speed.cmp(&b.upload_speed),
    }
}

/// A contiguous page of `items`, `has_more` true iff the window did not reach the end.
pub struct Page<'a, T> {
    /// The windowed items.
    pub rows: Vec<&'a T>,
    /// Total number of items before pagination.
    pub total: usize,
    /// Whether more items follow this window.
    pub has_more: bool,
}

/// Slice `items[offset..offset+page_size]`, clamped to bounds.
#[must_use]
pub fn paginate<'a, T>(items: Vec<&'a T>, offset: usize, page_size: usize) -> Page<'a, T> {
    let total = items.len();
    if offset >= total || page_size == 0 {
        return Page {
            rows: Vec::new(),
            total,
            has_more: offset < total,
        };
    }
    let end = (offset + page_size).min(total);
    let rows = items[offset..end].to_vec();
    Page {
        has_more: end < total,
        rows,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::model::TorrentState;

    fn torrent(name: &str, state: TorrentState, category: &str, tags: &[&str], age_secs: i64) -> TorrentView {
        TorrentView {
            infohash: name.to_lowercase(),
            name: name.into(),
            size: 0,
            progress: 0.0,
            state,
            ratio: 0.0,
            seeds: 0,
            leechers: 0,
            added_on: Utc::now() - Duration::seconds(age_secs),
            completed_on: None,
            last_activity: Utc::now(),
            category: category.into(),
            tags: tags.iter().map(|s| (*s).to_string()).collect(),
            tracker_host: "tracker.example".into(),
            save_path: "/data".into(),
            content_path: "/data/x".into(),
            eta_seconds: None,
            download_speed: 0,
            upload_speed: 0,
            total_downloaded: 0,
            total_uploaded: 0,
            availability: 0.0,
            private: false,
            labels: vec![],
        }
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let torrents = vec![torrent("Ubuntu ISO", TorrentState::Downloading, "linux", &[], 10)];
        let filter = FilterSpec {
            search: Some("ubuntu".into()),
            ..FilterSpec::default()
        };
        assert_eq!(apply_filter(&torrents, &filter).len(), 1);
    }

    #[test]
    fn tag_filter_matches_any_overlap() {
        let torrents = vec![torrent("a", TorrentState::Downloading, "x", &["a", "b"], 10)];
        let filter = FilterSpec {
            tags: vec!["a".into()],
            ..FilterSpec::default()
        };
        assert_eq!(apply_filter(&torrents, &filter).len(), 1);
    }

    #[test]
    fn exclusion_applied_after_inclusion() {
        let torrents = vec![torrent("a", TorrentState::Downloading, "movies", &[], 10)];
        let filter = FilterSpec {
            categories: vec!["movies".into()],
            exclude_categories: vec!["movies".into()],
            ..FilterSpec::default()
        };
        assert!(apply_filter(&torrents, &filter).is_empty());
    }

    #[test]
    fn sort_by_name_then_tiebreaker() {
        let t1 = torrent("b", TorrentState::Downloading, "", &[], 5);
        let t2 = torrent("a", TorrentState::Downloading, "", &[], 5);
        let mut refs = vec![&t1, &t2];
        apply_sort(&mut refs, &[SortKey { field: SortField::Name, direction: SortDirection::Asc }]);
        assert_eq!(refs[0].name, "a");
    }

    #[test]
    fn pagination_reports_has_more_correctly() {
        let t1 = torrent("a", TorrentState::Downloading, "", &[], 1);
        let t2 = torrent("b", TorrentState::Downloading, "", &[], 1);
        let t3 = torrent("c", TorrentState::Downloading, "", &[], 1);
        let refs = vec![&t1, &t2, &t3];
        let page = paginate(refs, 0, 2);
        assert_eq!(page.rows.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.total, 3);
    }
}
