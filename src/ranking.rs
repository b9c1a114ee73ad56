use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use uuid::Uuid;

use crate::models::{PeriodResult, Resident};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    HighestFirst,
    LowestFirst,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desc" | "highest" => Ok(SortOrder::HighestFirst),
            "asc" | "lowest" => Ok(SortOrder::LowestFirst),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

/// Display filters applied on top of the full ranking.
#[derive(Debug, Clone, Default)]
pub struct RankingQuery {
    pub room: Option<String>,
    pub search: Option<String>,
    pub order: SortOrder,
    /// Number of lowest-ranked dormers flagged for eviction.
    pub evict_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    /// 1-based position in the full ranking, independent of filters.
    pub rank: usize,
    pub result: PeriodResult,
    pub resident: Option<Resident>,
    pub evicted: bool,
}

/// Orders results by total descending. Equal totals keep fetch order.
pub fn rank(results: &[PeriodResult]) -> Vec<PeriodResult> {
    let mut ranked = results.to_vec();
    ranked.sort_by(|a, b| b.total_weighted_score.total_cmp(&a.total_weighted_score));
    ranked
}

/// A dormer at `rank` of `total` ranked is evicted when among the last `evict_count`.
pub fn is_evicted(rank: usize, total: usize, evict_count: usize) -> bool {
    rank > total.saturating_sub(evict_count)
}

fn matches_search(resident: &Resident, needle: &str) -> bool {
    resident.first_name.to_lowercase().contains(needle)
        || resident.last_name.to_lowercase().contains(needle)
        || resident.room.to_lowercase().contains(needle)
}

pub fn standings(
    results: &[PeriodResult],
    residents: &[Resident],
    query: &RankingQuery,
) -> Vec<Standing> {
    let by_id: HashMap<Uuid, &Resident> = residents.iter().map(|r| (r.id, r)).collect();
    let total = results.len();
    let room = query.room.as_deref().filter(|room| *room != "all");
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut selected: Vec<Standing> = rank(results)
        .into_iter()
        .enumerate()
        .map(|(index, result)| {
            let rank = index + 1;
            Standing {
                rank,
                resident: by_id.get(&result.target_dormer_id).map(|r| (*r).clone()),
                result,
                evicted: is_evicted(rank, total, query.evict_count),
            }
        })
        .filter(|standing| match room {
            Some(room) => standing
                .resident
                .as_ref()
                .is_some_and(|resident| resident.room == room),
            None => true,
        })
        .filter(|standing| match needle.as_deref() {
            Some(needle) => standing
                .resident
                .as_ref()
                .is_some_and(|resident| matches_search(resident, needle)),
            None => true,
        })
        .collect();

    if query.order == SortOrder::LowestFirst {
        selected.sort_by(|a, b| {
            a.result
                .total_weighted_score
                .total_cmp(&b.result.total_weighted_score)
        });
    }

    selected
}

/// Distinct non-empty rooms, sorted.
pub fn rooms(residents: &[Resident]) -> Vec<String> {
    residents
        .iter()
        .filter(|r| !r.room.is_empty())
        .map(|r| r.room.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Badge text shown next to the top three positions.
pub fn rank_label(rank: usize) -> String {
    match rank {
        1 => "Top Dormer".to_string(),
        2 => "2nd Top Dormer".to_string(),
        3 => "3rd Top Dormer".to_string(),
        other => format!("#{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resident(first: &str, room: &str) -> Resident {
        Resident {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: "Cruz".to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            room: room.to_string(),
            course_year: "BSED 1".to_string(),
        }
    }

    fn result_for(resident: &Resident, total: f64) -> PeriodResult {
        PeriodResult {
            target_dormer_id: resident.id,
            total_weighted_score: total,
            evaluation_period_id: Uuid::nil(),
        }
    }

    #[test]
    fn ties_keep_fetch_order() {
        let a = resident("Ana", "101");
        let b = resident("Ben", "102");
        let c = resident("Cy", "101");
        let results = vec![result_for(&a, 90.0), result_for(&b, 75.0), result_for(&c, 90.0)];

        let ranked = rank(&results);

        assert_eq!(ranked[0].target_dormer_id, a.id);
        assert_eq!(ranked[1].target_dormer_id, c.id);
        assert_eq!(ranked[2].target_dormer_id, b.id);
    }

    #[test]
    fn eviction_targets_the_bottom() {
        assert!(!is_evicted(1, 5, 2));
        assert!(!is_evicted(3, 5, 2));
        assert!(is_evicted(4, 5, 2));
        assert!(is_evicted(5, 5, 2));
        assert!(!is_evicted(5, 5, 0));
        assert!(is_evicted(1, 2, 5));
    }

    #[test]
    fn filters_keep_global_rank() {
        let a = resident("Ana", "101");
        let b = resident("Ben", "102");
        let c = resident("Cy", "101");
        let residents = vec![a.clone(), b.clone(), c.clone()];
        let results = vec![result_for(&a, 80.0), result_for(&b, 95.0), result_for(&c, 60.0)];
        let query = RankingQuery {
            room: Some("101".to_string()),
            evict_count: 1,
            ..RankingQuery::default()
        };

        let view = standings(&results, &residents, &query);

        assert_eq!(view.len(), 2);
        assert_eq!(view[0].rank, 2);
        assert!(!view[0].evicted);
        assert_eq!(view[1].rank, 3);
        assert!(view[1].evicted);
    }

    #[test]
    fn search_is_case_insensitive_and_order_flips() {
        let a = resident("Ana", "101");
        let b = resident("Anton", "202");
        let c = resident("Ben", "303");
        let residents = vec![a.clone(), b.clone(), c.clone()];
        let results = vec![result_for(&a, 70.0), result_for(&b, 85.0), result_for(&c, 60.0)];
        let query = RankingQuery {
            search: Some("  AN ".to_string()),
            order: SortOrder::LowestFirst,
            ..RankingQuery::default()
        };

        let view = standings(&results, &residents, &query);

        assert_eq!(view.len(), 2);
        assert_eq!(view[0].result.target_dormer_id, a.id);
        assert_eq!(view[0].rank, 2);
        assert_eq!(view[1].rank, 1);
    }

    #[test]
    fn rooms_are_unique_and_sorted() {
        let residents = vec![
            resident("A", "202"),
            resident("B", "101"),
            resident("C", "202"),
            resident("D", ""),
        ];
        assert_eq!(rooms(&residents), vec!["101".to_string(), "202".to_string()]);
    }

    #[test]
    fn labels_for_podium() {
        assert_eq!(rank_label(1), "Top Dormer");
        assert_eq!(rank_label(3), "3rd Top Dormer");
        assert_eq!(rank_label(7), "#7");
    }
}
