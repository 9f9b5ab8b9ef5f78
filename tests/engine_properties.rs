use photo_slideshow::engine::SlideshowEngine;
use photo_slideshow::source::ImageRecord;
use proptest::prelude::*;

fn records(ids: &[&str]) -> Vec<ImageRecord> {
    ids.iter()
        .map(|id| ImageRecord {
            id: id.to_string(),
            url: format!("https://img.test/{id}.webp"),
            width: 1024,
            height: 768,
            caption: String::new(),
            alt: String::new(),
            format: "webp".into(),
        })
        .collect()
}

fn numbered(n: usize) -> Vec<ImageRecord> {
    let ids: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    records(&refs)
}

#[test]
fn five_images_never_repeat_immediately() {
    let images = records(&["a", "b", "c", "d", "e"]);
    for seed in 0..50 {
        let mut engine = SlideshowEngine::new(images.clone(), 0, Some(seed));
        let mut previous = engine.current_index();
        for _ in 0..4 {
            let chosen = engine.advance().expect("advance should start a transition");
            assert_ne!(chosen, previous, "seed {seed}: immediate repeat");
            assert_eq!(engine.complete_transition(), Some(chosen));
            assert_eq!(engine.current_index(), chosen);
            previous = chosen;
        }
    }
}

#[test]
fn single_image_advance_stays_on_zero() {
    let mut engine = SlideshowEngine::new(records(&["only"]), 0, Some(7));
    assert_eq!(engine.advance(), Some(0));
    engine.complete_transition();
    assert_eq!(engine.current_index(), 0);
    assert!(!engine.is_transitioning());
    assert_eq!(engine.next_index(), None);
}

#[test]
fn seeded_engines_agree() {
    let mut a = SlideshowEngine::new(numbered(12), 0, Some(42));
    let mut b = SlideshowEngine::new(numbered(12), 0, Some(42));
    for _ in 0..25 {
        let x = a.advance();
        assert_eq!(x, b.advance());
        a.complete_transition();
        b.complete_transition();
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn advance_keeps_index_in_range(len in 2usize..40, seed in any::<u64>(), steps in 1usize..60) {
        let mut engine = SlideshowEngine::new(numbered(len), 0, Some(seed));
        for _ in 0..steps {
            let chosen = engine.advance();
            prop_assert!(chosen.is_some());
            prop_assert!(chosen.unwrap() < len);
            engine.complete_transition();
            prop_assert!(engine.current_index() < len);
        }
    }

    #[test]
    fn selection_avoids_recent_history(len in 2usize..60, seed in any::<u64>(), steps in 1usize..40) {
        let mut engine = SlideshowEngine::new(numbered(len), 0, Some(seed));
        let recent_count = (len / 3).min(10);
        for _ in 0..steps {
            let history: Vec<usize> = engine.recent_history().collect();
            let avoid = &history[history.len().saturating_sub(recent_count)..];
            let current = engine.current_index();
            let chosen = engine.advance().unwrap();
            prop_assert!(!avoid.contains(&chosen), "chose {} from avoid set {:?}", chosen, avoid);
            prop_assert_ne!(chosen, current);
            prop_assert!(engine.recent_history().count() <= (len - 1).min(10));
            engine.complete_transition();
        }
    }

    #[test]
    fn begin_transition_is_exclusive(len in 2usize..20, first in 0usize..20, second in 0usize..20) {
        let first = first % len;
        let second = second % len;
        let mut engine = SlideshowEngine::new(numbered(len), 0, Some(1));
        prop_assert!(engine.begin_transition(first));
        prop_assert!(!engine.begin_transition(second));
        prop_assert_eq!(engine.next_index(), Some(first));
        prop_assert!(engine.is_transitioning());
        engine.complete_transition();
        prop_assert_eq!(engine.current_index(), first);
        prop_assert_eq!(engine.next_index(), None);
        prop_assert!(!engine.is_transitioning());
    }
}
