use std::sync::Arc;

use fulltext::{
    search::bm25,
    BooleanQuery,
    DirectoryReader,
    Document,
    Field,
    IndexSearcher,
    IndexWriter,
    IndexWriterConfig,
    Occur,
    PhraseQuery,
    Query,
    ScoreMode,
    TopDocs,
};
use rand::{
    rngs::StdRng,
    Rng,
    SeedableRng,
};
use store::{
    Directory,
    FsDirectory,
    MmapDirectory,
};

fn fs_dir(tmp: &tempfile::TempDir) -> Arc<dyn Directory> {
    Arc::new(FsDirectory::open(tmp.path()).unwrap())
}

fn index_texts(directory: &Arc<dyn Directory>, texts: &[&str]) {
    let writer = IndexWriter::new(directory.clone(), IndexWriterConfig::default()).unwrap();
    for text in texts {
        let mut doc = Document::new();
        doc.add(Field::text("content", *text));
        writer.add_document(&doc).unwrap();
    }
    writer.commit().unwrap();
    writer.close().unwrap();
}

fn doc_ids(top: &TopDocs) -> Vec<u32> {
    top.score_docs.iter().map(|d| d.doc).collect()
}

#[test]
fn test_basic_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = fs_dir(&tmp);
    index_texts(
        &directory,
        &["apple", "apple apple", "apple apple apple", "banana"],
    );

    let reader = DirectoryReader::open(directory).unwrap();
    let searcher = IndexSearcher::new(&reader);
    let top = searcher.search(&Query::term("content", "apple"), 10).unwrap();

    assert_eq!(top.total_hits, 3);
    let mut ids = doc_ids(&top);
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(top.score_docs.iter().all(|d| d.score > 0.0));
    assert!(top
        .score_docs
        .windows(2)
        .all(|w| w[0].score >= w[1].score));

    // The ranking follows the BM25 formula exactly: with k1 = 1.2 and
    // b = 0.75, term-frequency growth outpaces the length penalty, so
    // the doc repeating "apple" three times ranks first.
    let expected: Vec<f32> = (0..3u32)
        .map(|doc| {
            let tf = (doc + 1) as f32;
            let length = (doc + 1) as f32;
            let idf = bm25::idf(3, 4);
            let avg = 7.0 / 4.0;
            idf * tf * (bm25::K1 + 1.0)
                / (tf + bm25::K1 * (1.0 - bm25::B + bm25::B * length / avg))
        })
        .collect();
    for hit in &top.score_docs {
        // Lengths decode through the sqrt-quantized norm byte, so allow
        // a small relative error.
        let want = expected[hit.doc as usize];
        assert!(
            (hit.score - want).abs() / want < 0.02,
            "doc {} scored {} want about {want}",
            hit.doc,
            hit.score
        );
    }
}

#[test]
fn test_length_normalization_ranks_shorter_docs_first() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = fs_dir(&tmp);
    index_texts(
        &directory,
        &[
            "target",
            "target one two three",
            "target one two three four five six seven eight",
            "target w1 w2 w3 w4 w5 w6 w7 w8 w9 w10 w11 w12 w13 w14 w15",
        ],
    );

    let reader = DirectoryReader::open(directory).unwrap();
    let searcher = IndexSearcher::new(&reader);
    let top = searcher
        .search(&Query::term("content", "target"), 10)
        .unwrap();

    assert_eq!(top.total_hits, 4);
    // Equal term frequency, growing lengths: shortest doc first.
    assert_eq!(doc_ids(&top), vec![0, 1, 2, 3]);
    assert!(top
        .score_docs
        .windows(2)
        .all(|w| w[0].score > w[1].score));
    assert!(top.score_docs[0].score - top.score_docs[3].score > 0.08);
}

#[test]
fn test_boolean_and() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = fs_dir(&tmp);
    index_texts(
        &directory,
        &[
            "apple",
            "banana",
            "apple banana",
            "apple cherry",
            "banana cherry",
        ],
    );

    let reader = DirectoryReader::open(directory).unwrap();
    let searcher = IndexSearcher::new(&reader);
    let query = BooleanQuery::builder()
        .add(Query::term("content", "apple"), Occur::Must)
        .add(Query::term("content", "banana"), Occur::Must)
        .build();
    let top = searcher.search(&query, 10).unwrap();
    assert_eq!(top.total_hits, 1);
    assert_eq!(doc_ids(&top), vec![2]);
}

#[test]
fn test_boolean_must_not_and_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = fs_dir(&tmp);
    index_texts(
        &directory,
        &[
            "apple",
            "apple banana",
            "apple cherry",
            "apple banana cherry",
        ],
    );

    let reader = DirectoryReader::open(directory).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = BooleanQuery::builder()
        .add(Query::term("content", "apple"), Occur::Must)
        .add(Query::term("content", "banana"), Occur::MustNot)
        .build();
    let top = searcher.search(&query, 10).unwrap();
    let mut ids = doc_ids(&top);
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 2]);

    // FILTER gates without scoring: same matches as MUST, score comes
    // from the scoring clause alone.
    let filtered = BooleanQuery::builder()
        .add(Query::term("content", "apple"), Occur::Must)
        .add(Query::term("content", "cherry"), Occur::Filter)
        .build();
    let scored = BooleanQuery::builder()
        .add(Query::term("content", "apple"), Occur::Must)
        .add(Query::term("content", "cherry"), Occur::Must)
        .build();
    let filtered_top = searcher.search(&filtered, 10).unwrap();
    let scored_top = searcher.search(&scored, 10).unwrap();
    let mut filtered_ids = doc_ids(&filtered_top);
    filtered_ids.sort_unstable();
    assert_eq!(filtered_ids, vec![2, 3]);
    assert_eq!(doc_ids(&filtered_top).len(), doc_ids(&scored_top).len());
    for (filtered_hit, scored_hit) in filtered_top
        .score_docs
        .iter()
        .zip(&scored_top.score_docs)
    {
        assert!(filtered_hit.score < scored_hit.score);
    }
}

#[test]
fn test_wand_matches_exhaustive_disjunction() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = fs_dir(&tmp);

    // 10k synthetic docs over a 100-word vocabulary, fixed seed, spread
    // over several segments.
    let vocabulary: Vec<String> = (0..100)
        .map(|i| match i {
            0 => "the".to_string(),
            1 => "and".to_string(),
            2 => "of".to_string(),
            _ => format!("word{i}"),
        })
        .collect();
    let mut rng = StdRng::seed_from_u64(42);
    let config = IndexWriterConfig {
        max_buffered_docs: Some(2000),
        ..IndexWriterConfig::default()
    };
    let writer = IndexWriter::new(directory.clone(), config).unwrap();
    for _ in 0..10_000 {
        let length = rng.random_range(5..25);
        let text = (0..length)
            .map(|_| vocabulary[rng.random_range(0..vocabulary.len())].as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let mut doc = Document::new();
        doc.add(Field::text("content", text));
        writer.add_document(&doc).unwrap();
    }
    writer.commit().unwrap();
    writer.close().unwrap();

    let reader = DirectoryReader::open(directory).unwrap();
    assert!(reader.leaves().len() > 1);
    let searcher = IndexSearcher::new(&reader);
    let query = BooleanQuery::builder()
        .add(Query::term("content", "the"), Occur::Should)
        .add(Query::term("content", "and"), Occur::Should)
        .add(Query::term("content", "of"), Occur::Should)
        .build();

    let pruned = searcher.search(&query, 10).unwrap();
    let exhaustive = searcher
        .search_with_mode(&query, 10, ScoreMode::Complete)
        .unwrap();

    assert_eq!(doc_ids(&pruned), doc_ids(&exhaustive));
    for (a, b) in pruned.score_docs.iter().zip(&exhaustive.score_docs) {
        assert!(
            (a.score - b.score).abs() <= 1e-4 * a.score.abs().max(1.0),
            "doc {}: {} vs {}",
            a.doc,
            a.score,
            b.score
        );
    }

    // Determinism: identical (reader, query, k) twice.
    let again = searcher.search(&query, 10).unwrap();
    assert_eq!(doc_ids(&pruned), doc_ids(&again));
    for (a, b) in pruned.score_docs.iter().zip(&again.score_docs) {
        assert_eq!(a.score, b.score);
    }
}

#[test]
fn test_phrase_query() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = fs_dir(&tmp);
    index_texts(
        &directory,
        &[
            "the quick brown fox jumps over the lazy dog",
            "a brown dog chased the fox",
            "quick and brown are colors",
        ],
    );

    let reader = DirectoryReader::open(directory).unwrap();
    let searcher = IndexSearcher::new(&reader);

    let query = PhraseQuery::builder("content")
        .add("quick")
        .add("brown")
        .add("fox")
        .build();
    let top = searcher.search(&query, 10).unwrap();
    assert_eq!(doc_ids(&top), vec![0]);
    assert!(top.score_docs[0].score > 0.0);

    let reversed = PhraseQuery::builder("content")
        .add("fox")
        .add("brown")
        .add("quick")
        .build();
    let top = searcher.search(&reversed, 10).unwrap();
    assert_eq!(top.total_hits, 0);
    assert!(top.score_docs.is_empty());
}

#[test]
fn test_phrase_counts_repeats() {
    let tmp = tempfile::tempdir().unwrap();
    let directory = fs_dir(&tmp);
    index_texts(
        &directory,
        &[
            "big cat big cat big cat",
            "big cat",
            "big dog big cat",
        ],
    );

    let reader = DirectoryReader::open(directory).unwrap();
    let searcher = IndexSearcher::new(&reader);
    let query = PhraseQuery::builder("content").add("big").add("cat").build();
    let top = searcher.search(&query, 10).unwrap();
    assert_eq!(top.total_hits, 3);
    // Three phrase hits in one short doc beats one each elsewhere.
    assert_eq!(top.score_docs[0].doc, 0);
}

#[test]
fn test_search_on_mmap_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let directory: Arc<dyn Directory> = Arc::new(MmapDirectory::open(tmp.path()).unwrap());
    index_texts(
        &directory,
        &["grape melon", "melon", "grape grape melon kiwi"],
    );

    let reader = DirectoryReader::open(directory).unwrap();
    let searcher = IndexSearcher::new(&reader);
    let top = searcher.search(&Query::term("content", "grape"), 5).unwrap();
    assert_eq!(top.total_hits, 2);
    let mut ids = doc_ids(&top);
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 2]);
}

#[test]
fn test_search_rejects_zero_k() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let directory = fs_dir(&tmp);
    index_texts(&directory, &["solo"]);
    let reader = DirectoryReader::open(directory)?;
    let searcher = IndexSearcher::new(&reader);
    assert!(matches!(
        searcher.search(&Query::term("content", "solo"), 0),
        Err(fulltext::Error::InvalidArgument(_))
    ));
    Ok(())
}
