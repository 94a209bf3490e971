//! The Parallel Batcher: groups refinement tasks into batches whose
//! members are never adjacent, so executors never corrupt each other's
//! markdown neighbours.

use coursegen_types::SectionRefinementTask;

/// Numbered ids (`sec_<n>`) use the integer directly; named ids hash to a
/// stable non-negative value so they're treated as non-adjacent to any
/// numbered section: named and numbered sections interleave in index
/// space rather than being segregated into separate ranges.
pub fn section_index(section_id: &str) -> i64 {
    if let Some(rest) = section_id.strip_prefix("sec_") {
        if let Ok(n) = rest.parse::<i64>() {
            return n;
        }
    }
    (fnv1a(section_id) & 0x7fff_ffff_ffff_ffff) as i64
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Sorts by priority (critical first), then greedily places each task
/// into the earliest batch whose members are all more than
/// `adjacent_gap` sections away and that has not yet reached
/// `max_concurrency`.
pub fn batch_tasks(
    mut tasks: Vec<SectionRefinementTask>,
    max_concurrency: usize,
    adjacent_gap: i64,
) -> Vec<Vec<SectionRefinementTask>> {
    tasks.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then_with(|| section_index(&a.section_id).cmp(&section_index(&b.section_id)))
    });

    let mut batches: Vec<Vec<SectionRefinementTask>> = Vec::new();
    let mut batch_indices: Vec<Vec<i64>> = Vec::new();

    'tasks: for task in tasks {
        let idx = section_index(&task.section_id);
        for (batch, indices) in batches.iter_mut().zip(batch_indices.iter_mut()) {
            let fits = batch.len() < max_concurrency
                && indices.iter().all(|&existing| (existing - idx).abs() > adjacent_gap);
            if fits {
                indices.push(idx);
                batch.push(task);
                continue 'tasks;
            }
        }
        batches.push(vec![task]);
        batch_indices.push(vec![idx]);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegen_types::{Criterion, FixAction, Severity, TargetedIssue};

    fn task(section_id: &str) -> SectionRefinementTask {
        SectionRefinementTask {
            section_id: section_id.to_string(),
            source_issues: vec![TargetedIssue {
                id: format!("{section_id}-issue"),
                criterion: Criterion::ClarityReadability,
                severity: Severity::Minor,
                location: section_id.to_string(),
                description: "d".into(),
                suggested_fix: "f".into(),
                target_section_id: section_id.to_string(),
                fix_action: FixAction::SurgicalEdit,
                context: coursegen_types::refinement::ContextWindow {
                    scope: "s".into(),
                    start_quote: String::new(),
                    end_quote: String::new(),
                },
                fix_instructions: String::new(),
            }],
            previous_section_tail: None,
            next_section_head: None,
        }
    }

    fn assert_batches_satisfy_adjacency(batches: &[Vec<SectionRefinementTask>], gap: i64) {
        for batch in batches {
            for a in batch {
                for b in batch {
                    if a.section_id != b.section_id {
                        assert!((section_index(&a.section_id) - section_index(&b.section_id)).abs() > gap);
                    }
                }
            }
        }
    }

    #[test]
    fn numbered_ids_use_their_integer_directly() {
        assert_eq!(section_index("sec_7"), 7);
        assert_eq!(section_index("sec_0"), 0);
    }

    #[test]
    fn named_ids_hash_to_a_stable_non_negative_value() {
        let a = section_index("sec_introduction");
        let b = section_index("sec_introduction");
        assert_eq!(a, b);
        assert!(a >= 0);
    }

    #[test]
    fn five_consecutive_sections_batch_into_two_groups() {
        let tasks: Vec<_> = (0..5).map(|i| task(&format!("sec_{i}"))).collect();
        let batches = batch_tasks(tasks, 3, 1);
        assert_eq!(batches.len(), 2);
        assert_batches_satisfy_adjacency(&batches, 1);
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn every_pair_adjacent_yields_one_batch_per_task() {
        // gap of 10 makes every pair among 0..4 "adjacent" (within gap).
        let tasks: Vec<_> = (0..4).map(|i| task(&format!("sec_{i}"))).collect();
        let batches = batch_tasks(tasks, 3, 10);
        assert_eq!(batches.len(), 4);
        for batch in &batches {
            assert_eq!(batch.len(), 1);
        }
    }

    #[test]
    fn batch_size_never_exceeds_max_concurrency() {
        let tasks: Vec<_> = (0..9).map(|i| task(&format!("sec_{}", i * 10))).collect();
        let batches = batch_tasks(tasks, 3, 1);
        for batch in &batches {
            assert!(batch.len() <= 3);
        }
    }
}
