//! Prioritization: source merge, ordering and focus quota

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{Category, InsightCandidate, Preferences, Priority, Provenance};

/// Domain relevance of a candidate to the subject's preferences
pub fn relevance(candidate: &InsightCandidate, preferences: &Preferences) -> f64 {
    let mut score = 0.0;
    if preferences.focus_areas.contains(&candidate.category) {
        score += 1.0;
    }
    if preferences.style.affinity().contains(&candidate.category) {
        score += 0.5;
    }
    if candidate.technique.is_some() {
        score += 0.25;
    }
    score
}

/// Total order: priority desc, relevance desc, confidence desc, then
/// category, title and id so equal inputs always sort the same way
pub fn compare(a: &InsightCandidate, b: &InsightCandidate, preferences: &Preferences) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| {
            relevance(b, preferences)
                .partial_cmp(&relevance(a, preferences))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_candidates(candidates: &mut [InsightCandidate], preferences: &Preferences) {
    candidates.sort_by(|a, b| compare(a, b, preferences));
}

/// Merge external candidates into the rule-engine set.
///
/// When an external candidate shares a category with rule-engine output, it
/// replaces the strongest rule candidate of that category only if its
/// confidence is strictly higher; otherwise it is dropped.
pub fn merge_sources(
    mut rule: Vec<InsightCandidate>,
    external: Vec<InsightCandidate>,
) -> Vec<InsightCandidate> {
    for candidate in external {
        let rival = rule
            .iter()
            .enumerate()
            .filter(|(_, r)| r.category == candidate.category && r.provenance != Provenance::ExternalReasoning)
            .max_by(|(_, a), (_, b)| a.confidence.partial_cmp(&b.confidence).unwrap_or(Ordering::Equal))
            .map(|(i, r)| (i, r.confidence));

        match rival {
            None => rule.push(candidate),
            Some((index, confidence)) if candidate.confidence > confidence => {
                tracing::debug!(category = %candidate.category, "External candidate replaces rule candidate");
                rule[index] = candidate;
            }
            Some(_) => {
                tracing::debug!(category = %candidate.category, "Rule candidate kept over external candidate");
            }
        }
    }
    rule
}

/// Apply the focus quota to a sorted list and cap it at `max`.
///
/// Without focus areas this is a plain cap. With focus areas: up to
/// `quota` candidates per focused category, plus every CRITICAL candidate
/// from other categories. If nothing matches the focus, the unfocused list
/// is used so the subject still gets something.
pub fn apply_quota(
    sorted: Vec<InsightCandidate>,
    preferences: &Preferences,
    max: usize,
    quota: usize,
) -> Vec<InsightCandidate> {
    let quota = quota.max(1);
    if preferences.focus_areas.is_empty() {
        return sorted.into_iter().take(max).collect();
    }

    let mut per_category: HashMap<Category, usize> = HashMap::new();
    let mut selected = Vec::new();
    let mut rest = Vec::new();

    for candidate in sorted {
        let focused = preferences.focus_areas.contains(&candidate.category);
        let taken = per_category.entry(candidate.category).or_insert(0);
        if focused && *taken < quota {
            *taken += 1;
            selected.push(candidate);
        } else {
            rest.push(candidate);
        }
    }

    if selected.is_empty() {
        tracing::debug!("No candidates in focus areas, using unfocused order");
        rest.truncate(max);
        return rest;
    }

    // CRITICAL backfill ignores the quota; `rest` keeps sorted order
    selected.extend(
        rest.into_iter()
            .filter(|c| c.priority == Priority::Critical && !preferences.focus_areas.contains(&c.category)),
    );

    cap_preserving_focus(selected, preferences, max)
}

/// Cap at `max`. CRITICAL candidates claim slots first, then the best
/// candidate of each focused category while there is room, then the rest in
/// rank order. Input and output are in sorted order.
fn cap_preserving_focus(
    mut selected: Vec<InsightCandidate>,
    preferences: &Preferences,
    max: usize,
) -> Vec<InsightCandidate> {
    sort_candidates(&mut selected, preferences);
    if selected.len() <= max {
        return selected;
    }

    let mut keep = vec![false; selected.len()];
    let mut kept = 0;

    for (index, candidate) in selected.iter().enumerate() {
        if kept == max {
            break;
        }
        if candidate.priority == Priority::Critical {
            keep[index] = true;
            kept += 1;
        }
    }

    let mut represented: HashSet<Category> = selected
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(c, _)| c.category)
        .collect();
    for (index, candidate) in selected.iter().enumerate() {
        if kept == max {
            break;
        }
        if !keep[index]
            && preferences.focus_areas.contains(&candidate.category)
            && represented.insert(candidate.category)
        {
            keep[index] = true;
            kept += 1;
        }
    }

    for flag in keep.iter_mut() {
        if kept == max {
            break;
        }
        if !*flag {
            *flag = true;
            kept += 1;
        }
    }

    selected
        .into_iter()
        .zip(keep)
        .filter_map(|(c, k)| k.then_some(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Style, Technique};
    use chrono::Utc;

    fn candidate(category: Category, priority: Priority, confidence: f64) -> InsightCandidate {
        InsightCandidate::new(
            category,
            priority,
            format!("{} {}", category, priority),
            "message",
            Provenance::RuleEngine,
            Utc::now(),
        )
        .with_confidence(confidence)
    }

    fn priorities(list: &[InsightCandidate]) -> Vec<Priority> {
        list.iter().map(|c| c.priority).collect()
    }

    #[test]
    fn test_priority_order() {
        let mut list = vec![
            candidate(Category::Pattern, Priority::Low, 0.5),
            candidate(Category::Warning, Priority::Critical, 0.5),
            candidate(Category::Trigger, Priority::Medium, 0.5),
            candidate(Category::Coping, Priority::High, 0.5),
        ];
        sort_candidates(&mut list, &Preferences::default());
        assert_eq!(
            priorities(&list),
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_relevance_breaks_priority_ties() {
        let prefs = Preferences {
            style: Style::Direct,
            ..Default::default()
        };
        let mut list = vec![
            candidate(Category::Coping, Priority::Medium, 0.9),
            candidate(Category::Trigger, Priority::Medium, 0.4),
        ];
        sort_candidates(&mut list, &prefs);
        assert_eq!(list[0].category, Category::Trigger);

        let technique = candidate(Category::Education, Priority::Low, 0.1).with_technique(Technique::Mindfulness);
        assert_eq!(relevance(&technique, &Preferences::default()), 0.25);
    }

    #[test]
    fn test_confidence_is_final_tiebreak() {
        let mut list = vec![
            candidate(Category::Pattern, Priority::Medium, 0.4),
            candidate(Category::Pattern, Priority::Medium, 0.8),
        ];
        sort_candidates(&mut list, &Preferences::default());
        assert_eq!(list[0].confidence, 0.8);
    }

    #[test]
    fn test_merge_prefers_higher_confidence() {
        let rule = vec![candidate(Category::Coping, Priority::Medium, 0.6)];
        let mut strong = candidate(Category::Coping, Priority::Medium, 0.8);
        strong.provenance = Provenance::ExternalReasoning;
        let merged = merge_sources(rule.clone(), vec![strong]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].provenance, Provenance::ExternalReasoning);

        let mut tie = candidate(Category::Coping, Priority::Medium, 0.6);
        tie.provenance = Provenance::ExternalReasoning;
        let merged = merge_sources(rule.clone(), vec![tie]);
        assert_eq!(merged[0].provenance, Provenance::RuleEngine);

        let mut other = candidate(Category::Education, Priority::Low, 0.3);
        other.provenance = Provenance::ExternalReasoning;
        assert_eq!(merge_sources(rule, vec![other]).len(), 2);
    }

    #[test]
    fn test_quota_and_critical_backfill() {
        let prefs = Preferences {
            focus_areas: [Category::Coping].into_iter().collect(),
            ..Default::default()
        };
        let mut list = vec![
            candidate(Category::Coping, Priority::Medium, 0.9),
            candidate(Category::Coping, Priority::Low, 0.8),
            candidate(Category::Coping, Priority::Low, 0.7),
            candidate(Category::Warning, Priority::Critical, 0.9),
            candidate(Category::Pattern, Priority::High, 0.9),
        ];
        sort_candidates(&mut list, &prefs);

        let out = apply_quota(list, &prefs, 5, 2);
        let categories: Vec<_> = out.iter().map(|c| c.category).collect();
        assert_eq!(categories, vec![Category::Warning, Category::Coping, Category::Coping]);
    }

    #[test]
    fn test_quota_falls_back_without_focus_matches() {
        let prefs = Preferences {
            focus_areas: [Category::Celebration].into_iter().collect(),
            ..Default::default()
        };
        let list = vec![
            candidate(Category::Coping, Priority::Medium, 0.9),
            candidate(Category::Pattern, Priority::Low, 0.9),
        ];
        assert_eq!(apply_quota(list, &prefs, 5, 2).len(), 2);
    }

    #[test]
    fn test_cap_keeps_each_focus_category() {
        let prefs = Preferences {
            focus_areas: [Category::Coping, Category::Trigger].into_iter().collect(),
            ..Default::default()
        };
        let mut list = vec![
            candidate(Category::Warning, Priority::Critical, 0.9),
            candidate(Category::Pattern, Priority::Critical, 0.8),
            candidate(Category::Coping, Priority::Low, 0.5),
            candidate(Category::Trigger, Priority::Low, 0.4),
        ];
        sort_candidates(&mut list, &prefs);

        let out = apply_quota(list.clone(), &prefs, 3, 2);
        let categories: Vec<_> = out.iter().map(|c| c.category).collect();
        assert_eq!(categories, vec![Category::Warning, Category::Pattern, Category::Coping]);

        let out = apply_quota(list, &prefs, 4, 2);
        assert_eq!(out.len(), 4);
        assert!(out.iter().any(|c| c.category == Category::Trigger));
    }

    #[test]
    fn test_critical_outranks_focus_when_cap_is_tight() {
        let prefs = Preferences {
            focus_areas: [Category::Coping].into_iter().collect(),
            ..Default::default()
        };
        let mut list = vec![
            candidate(Category::Coping, Priority::Low, 0.5),
            candidate(Category::Warning, Priority::Critical, 0.9),
            candidate(Category::Pattern, Priority::Critical, 0.8),
        ];
        sort_candidates(&mut list, &prefs);

        let out = apply_quota(list, &prefs, 2, 2);
        assert!(out.iter().all(|c| c.priority == Priority::Critical));
    }
}
