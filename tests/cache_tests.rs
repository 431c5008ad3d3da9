//! Load-once behavior of the grammar cache under concurrent use.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use duet::transform::{GrammarSource, MemorySource, SourceError, Transcoder};
use duet::{EngineError, GrammarCache};

const UPPER: &str = r#"%entry r; r : x=[a-z]+ <=> "<" x=[a-z]+ ">" ;"#;

/// Wraps a source and counts fetches.
struct CountingSource {
    inner: MemorySource,
    fetches: Arc<AtomicUsize>,
}

impl GrammarSource for CountingSource {
    fn fetch(&self, reference: &str) -> Result<String, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.inner.fetch(reference)
    }
}

fn counting(inner: MemorySource) -> (Transcoder, Arc<AtomicUsize>) {
    let fetches = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        inner,
        fetches: Arc::clone(&fetches),
    };
    (Transcoder::new(source), fetches)
}

#[test]
fn concurrent_first_use_loads_once() {
    let (transcoder, fetches) = counting(MemorySource::new().with("upper", UPPER));
    let transcoder = Arc::new(transcoder);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let transcoder = Arc::clone(&transcoder);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let input = "abc".repeat(i + 1);
                transcoder.transform("upper", &input, "a2b").unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!("<{}>", "abc".repeat(i + 1)));
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(transcoder.cache().len(), 1);
}

#[test]
fn grammar_errors_are_cached_until_evicted() {
    let source = MemorySource::new().with("broken", "r = nowhere ;");
    let (transcoder, fetches) = counting(source);

    for _ in 0..3 {
        assert!(matches!(
            transcoder.transform("broken", "x", "a2b"),
            Err(EngineError::Grammar(_))
        ));
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    assert!(transcoder.cache().evict("broken"));
    let _ = transcoder.transform("broken", "x", "a2b");
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[test]
fn unavailable_sources_are_retried() {
    let (transcoder, fetches) = counting(MemorySource::new());
    for _ in 0..2 {
        let Err(EngineError::Grammar(error)) = transcoder.transform("later", "x", "a2b") else {
            panic!("expected a grammar error");
        };
        assert_eq!(error.kind.code_suffix(), "source_unavailable");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
    assert!(transcoder.cache().is_empty());
}

#[test]
fn transcoders_can_share_a_cache() {
    let cache = Arc::new(GrammarCache::new());
    let (first, first_fetches) = counting(MemorySource::new().with("upper", UPPER));
    let (second, second_fetches) = counting(MemorySource::new().with("upper", UPPER));
    let first = first.with_cache(Arc::clone(&cache));
    let second = second.with_cache(Arc::clone(&cache));

    assert_eq!(first.transform("upper", "ab", "a2b").unwrap(), "<ab>");
    assert_eq!(second.transform("upper", "cd", "a2b").unwrap(), "<cd>");
    assert_eq!(first_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(second_fetches.load(Ordering::SeqCst), 0);

    let same = Arc::ptr_eq(&first.grammar("upper").unwrap(), &second.grammar("upper").unwrap());
    assert!(same);
}
