use offline_sort::{SortConfig, SortError, Sorter, SpillProvider, TempFileProvider, TryKey};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const ENTRIES_PER_CHUNK: usize = 900;
const COUNT: usize = 10_000;

/// Real temp files, with every open and close counted.
#[derive(Clone)]
struct CountingProvider {
    inner: TempFileProvider,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl CountingProvider {
    fn new(temp_dir: &TempDir) -> Self {
        Self {
            inner: TempFileProvider::in_directory(temp_dir.path()),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SpillProvider for CountingProvider {
    type Resource = File;

    fn open(&self) -> io::Result<File> {
        let file = self.inner.open()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(file)
    }

    fn close(&self, resource: File) -> io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close(resource)
    }
}

/// Iterator over a shared vector, read lazily one element at a time.
struct SharedInput<T> {
    data: Rc<RefCell<Vec<T>>>,
    position: usize,
}

impl<T> SharedInput<T> {
    fn new(data: &Rc<RefCell<Vec<T>>>) -> Self {
        Self {
            data: Rc::clone(data),
            position: 0,
        }
    }
}

impl<T: Clone> Iterator for SharedInput<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.data.borrow().get(self.position).cloned();
        self.position += 1;
        item
    }
}

type Row = (String, usize, String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    a: usize,
    b: usize,
    c: String,
}

fn hex(rng: &mut StdRng) -> String {
    format!("{:016x}{:016x}", rng.random::<u64>(), rng.random::<u64>())
}

fn random_rows(count: usize, seed: u64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|i| (hex(&mut rng), i, hex(&mut rng))).collect()
}

fn round_to_ten(value: usize) -> usize {
    (value + 5) / 10 * 10
}

fn expected_spills(count: usize, capacity: usize) -> usize {
    let chunks = count.div_ceil(capacity);
    if chunks <= 1 {
        0
    } else {
        chunks
    }
}

fn in_memory_sort<T: Clone, K: Ord>(input: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut sorted = input.to_vec();
    sorted.sort_by_key(|record| key(record));
    sorted
}

fn assert_sorts_like_memory<T, K>(input: Vec<T>, capacity: usize, key: fn(&T) -> K)
where
    T: Clone + PartialEq + Serialize + for<'de> Deserialize<'de> + Send,
    K: Ord + Send,
{
    let temp_dir = TempDir::new().unwrap();
    let provider = CountingProvider::new(&temp_dir);
    let expected = in_memory_sort(&input, key);
    let count = input.len();

    let mut sorter = Sorter::new(input, capacity, key)
        .unwrap()
        .with_provider(provider.clone());
    let sorted = sorter.sort().unwrap();

    // Both sorts are stable, so even records with equal keys line up.
    assert_eq!(sorted.len(), count);
    assert!(sorted.as_slice() == expected.as_slice(), "records differ from the in-memory sort");

    let spills = expected_spills(count, capacity);
    assert_eq!(provider.opened(), spills);
    assert_eq!(provider.closed(), spills);
}

#[test]
fn test_arrays_sort_like_in_memory() {
    assert_sorts_like_memory(random_rows(COUNT, 1), ENTRIES_PER_CHUNK, |row: &Row| row.2.clone());
}

#[test]
fn test_arrays_below_and_at_chunk_size() {
    for count in [ENTRIES_PER_CHUNK - 1, ENTRIES_PER_CHUNK] {
        assert_sorts_like_memory(random_rows(count, 2), ENTRIES_PER_CHUNK, |row: &Row| row.2.clone());
    }
}

#[test]
fn test_arrays_with_multiple_sort_keys() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut rows: Vec<Row> = (0..COUNT)
        .map(|i| (round_to_ten(i).to_string(), i, hex(&mut rng)))
        .collect();
    rows.shuffle(&mut rng);

    assert_sorts_like_memory(rows, ENTRIES_PER_CHUNK, |row: &Row| (row.0.clone(), row.1));
}

#[test]
fn test_maps_sort_like_in_memory() {
    let mut rng = StdRng::seed_from_u64(4);
    let maps: Vec<BTreeMap<String, String>> = (0..COUNT)
        .map(|i| {
            BTreeMap::from([
                ("a".to_string(), hex(&mut rng)),
                ("b".to_string(), i.to_string()),
                ("c".to_string(), hex(&mut rng)),
            ])
        })
        .collect();

    assert_sorts_like_memory(maps, ENTRIES_PER_CHUNK, |map: &BTreeMap<String, String>| {
        map.get("c").cloned()
    });
}

#[test]
fn test_structs_with_multiple_sort_keys() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut entries: Vec<Entry> = (0..COUNT)
        .map(|i| Entry {
            a: round_to_ten(i),
            b: i,
            c: hex(&mut rng),
        })
        .collect();
    entries.shuffle(&mut rng);

    assert_sorts_like_memory(entries, ENTRIES_PER_CHUNK, |e: &Entry| (e.a, e.c.clone()));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Measurement {
    id: u32,
    value: f64,
    correction: Option<Option<f64>>,
    label: String,
}

#[test]
fn test_spilled_payloads_come_back_unchanged() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut ids: Vec<u32> = (0..COUNT as u32).collect();
    ids.shuffle(&mut rng);

    let measurements: Vec<Measurement> = ids
        .into_iter()
        .map(|id| Measurement {
            id,
            value: match id % 50 {
                0 => f64::NAN,
                1 => f64::NEG_INFINITY,
                _ => rng.random::<f64>() * 1e6 - 5e5,
            },
            correction: match id % 3 {
                0 => None,
                1 => Some(None),
                _ => Some(Some(rng.random::<f64>())),
            },
            label: format!("m{}\t\"{}\"\n\\{}", id, hex(&mut rng), '\u{e9}'),
        })
        .collect();

    let temp_dir = TempDir::new().unwrap();
    let provider = CountingProvider::new(&temp_dir);
    let expected = in_memory_sort(&measurements, |m: &Measurement| m.id);

    let mut sorter = Sorter::new(measurements, ENTRIES_PER_CHUNK, |m: &Measurement| m.id)
        .unwrap()
        .with_provider(provider.clone());
    let sorted = sorter.sort().unwrap();

    assert_eq!(sorted.len(), expected.len());
    for (got, want) in sorted.iter().zip(&expected) {
        assert_eq!(got.id, want.id);
        assert_eq!(got.value.to_bits(), want.value.to_bits(), "value of {}", want.id);
        assert_eq!(
            got.correction.map(|c| c.map(f64::to_bits)),
            want.correction.map(|c| c.map(f64::to_bits))
        );
        assert_eq!(got.label, want.label);
    }
    assert_eq!(provider.opened(), expected_spills(COUNT, ENTRIES_PER_CHUNK));
}

#[test]
fn test_composite_key_orders_lexicographically() {
    let input = vec![(2, 'b'), (1, 'z'), (2, 'a'), (1, 'a'), (0, 'q')];
    let mut sorter = Sorter::new(input, 2, |r: &(u8, char)| (r.0, r.1)).unwrap();

    let sorted = sorter.sort().unwrap().to_vec();
    assert_eq!(sorted, vec![(0, 'q'), (1, 'a'), (1, 'z'), (2, 'a'), (2, 'b')]);
}

#[test]
fn test_sorted_twice_gives_same_result() {
    let rows = random_rows(2_000, 6);
    let mut sorter = Sorter::new(rows, 300, |row: &Row| row.2.clone()).unwrap();

    let first = sorter.sort().unwrap();
    let second = sorter.sort().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.iter().count(), second.iter().count());
}

#[test]
fn test_cached_result_survives_clearing_the_input() {
    for count in [ENTRIES_PER_CHUNK - 1, ENTRIES_PER_CHUNK, 3 * ENTRIES_PER_CHUNK + 7] {
        let data = Rc::new(RefCell::new(random_rows(count, 7)));
        let expected = in_memory_sort(&data.borrow(), |row: &Row| row.2.clone());

        let mut sorter =
            Sorter::new(SharedInput::new(&data), ENTRIES_PER_CHUNK, |row: &Row| row.2.clone())
                .unwrap();
        let offline = sorter.sort().unwrap();

        data.borrow_mut().clear();

        assert_eq!(offline.to_vec(), expected);
        assert_eq!(sorter.sort().unwrap().to_vec(), expected);

        let mut fresh =
            Sorter::new(SharedInput::new(&data), ENTRIES_PER_CHUNK, |row: &Row| row.2.clone())
                .unwrap();
        assert!(fresh.sort().unwrap().is_empty());
    }
}

#[test]
fn test_equal_keys_keep_input_order_across_chunks() {
    let input: Vec<(u8, usize)> = (0..100).map(|i| ((i % 3) as u8, i)).collect();
    let mut sorter = Sorter::new(input, 8, |r: &(u8, usize)| r.0).unwrap();

    let sorted = sorter.sort().unwrap();
    for pair in sorted.as_slice().windows(2) {
        if pair[0].0 == pair[1].0 {
            assert!(pair[0].1 < pair[1].1);
        }
    }
}

#[test]
fn test_view_is_shared_across_threads() {
    let mut rng = StdRng::seed_from_u64(8);
    let values: Vec<u32> = (0..5_000).map(|_| rng.random_range(0..1_000)).collect();
    let mut sorter = Sorter::new(values, 512, |v: &u32| *v).unwrap();
    let view = sorter.sort().unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let view = view.clone();
            scope.spawn(move || {
                assert_eq!(view.len(), 5_000);
                assert!(view.iter().zip(view.iter().skip(1)).all(|(a, b)| a <= b));
            });
        }
    });
}

#[test]
fn test_failing_input_releases_every_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let provider = CountingProvider::new(&temp_dir);
    let input = (0..50).map(|i| {
        if i == 37 {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input truncated"))
        } else {
            Ok(i)
        }
    });

    let mut sorter = Sorter::from_results(input, SortConfig::with_chunk_capacity(10), |v: &i32| *v)
        .unwrap()
        .with_provider(provider.clone());
    let err = sorter.sort().unwrap_err();

    assert!(matches!(err, SortError::InputConsumption(_)));
    assert_eq!(provider.opened(), 3);
    assert_eq!(provider.closed(), 3);
}

#[test]
fn test_failing_key_function_is_surfaced() {
    let temp_dir = TempDir::new().unwrap();
    let provider = CountingProvider::new(&temp_dir);
    let key = TryKey(|v: &i32| {
        if *v < 0 {
            Err(format!("negative value {}", v))
        } else {
            Ok(*v)
        }
    });

    let mut sorter = Sorter::new(vec![4, 3, 2, 1, -1], 2, key)
        .unwrap()
        .with_provider(provider.clone());
    let err = sorter.sort().unwrap_err();

    assert_eq!(err.to_string(), "key function failed: negative value -1");
    assert_eq!(provider.opened(), 2);
    assert_eq!(provider.closed(), 2);
    assert!(matches!(sorter.sort(), Err(SortError::Aborted)));
}
