use crate::domain::entities::Post;
use crate::shared::config::SearchConfig;
use lru::LruCache;
use std::cmp::Ordering;
use std::num::NonZeroUsize;

const QUERY_MEMO_CAPACITY: usize = 32;

struct IndexedPost {
    post: Post,
    title: Vec<char>,
    content: Vec<char>,
    tags: Vec<Vec<char>>,
}

#[derive(Debug, Clone)]
struct ScoredHit {
    position: usize,
    score: f64,
}

/// 投稿スナップショットに対するあいまい検索インデックス
///
/// 構築元の一覧のバージョンを持つ。呼び出し側は[`PostSearchIndex::version`]を
/// 現在の一覧と比較し、異なれば再構築する。同じクエリの結果はそれまでキャッシュする。
pub struct PostSearchIndex {
    version: u64,
    options: SearchConfig,
    entries: Vec<IndexedPost>,
    memo: LruCache<String, Vec<ScoredHit>>,
}

impl PostSearchIndex {
    pub fn build(posts: &[Post], version: u64, options: SearchConfig) -> Self {
        let entries = posts
            .iter()
            .map(|post| IndexedPost {
                post: post.clone(),
                title: normalize(&post.title),
                content: normalize(&post.content),
                tags: post.tags.iter().map(|tag| normalize(tag)).collect(),
            })
            .collect();

        Self {
            version,
            options,
            entries,
            memo: LruCache::new(
                NonZeroUsize::new(QUERY_MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 空でないクエリの一致結果をスコアの良い順で返す
    pub fn search(&mut self, query: &str) -> Vec<Post> {
        let pattern = normalize(query.trim());
        if pattern.is_empty() {
            return Vec::new();
        }

        let key: String = pattern.iter().collect();
        if let Some(hits) = self.memo.get(&key) {
            return hits
                .iter()
                .map(|hit| self.entries[hit.position].post.clone())
                .collect();
        }

        let mut hits: Vec<ScoredHit> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                best_entry_score(entry, &pattern, &self.options)
                    .map(|score| ScoredHit { position, score })
            })
            .collect();

        let entries = &self.entries;
        hits.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    entries[b.position]
                        .post
                        .created_at
                        .cmp(&entries[a.position].post.created_at)
                })
                .then_with(|| {
                    entries[a.position]
                        .post
                        .id
                        .cmp(&entries[b.position].post.id)
                })
        });

        let results = hits
            .iter()
            .map(|hit| self.entries[hit.position].post.clone())
            .collect();
        self.memo.put(key, hits);
        results
    }
}

fn normalize(value: &str) -> Vec<char> {
    value.to_lowercase().chars().collect()
}

fn best_entry_score(entry: &IndexedPost, pattern: &[char], options: &SearchConfig) -> Option<f64> {
    std::iter::once(&entry.title)
        .chain(std::iter::once(&entry.content))
        .chain(entry.tags.iter())
        .filter_map(|text| field_score(pattern, text, options))
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

/// `text`中の`pattern`の近似一致で最良のスコア。閾値を超える場合は`None`
///
/// 0は期待位置での完全一致。
pub(crate) fn field_score(pattern: &[char], text: &[char], options: &SearchConfig) -> Option<f64> {
    let m = pattern.len();
    if m == 0 || text.is_empty() {
        return None;
    }

    // パターンの各接頭辞について編集コストと一致開始位置を保持する列
    let mut prev_cost: Vec<usize> = (0..=m).collect();
    let mut prev_start: Vec<usize> = vec![0; m + 1];
    let mut cur_cost = vec![0usize; m + 1];
    let mut cur_start = vec![0usize; m + 1];
    let mut best: Option<f64> = None;

    for (j, text_char) in text.iter().enumerate() {
        cur_cost[0] = 0;
        cur_start[0] = j + 1;

        for i in 1..=m {
            let substitution = usize::from(pattern[i - 1] != *text_char);
            let mut cost = prev_cost[i - 1] + substitution;
            let mut start = prev_start[i - 1];

            if cur_cost[i - 1] + 1 < cost {
                cost = cur_cost[i - 1] + 1;
                start = cur_start[i - 1];
            }
            if prev_cost[i] + 1 < cost {
                cost = prev_cost[i] + 1;
                start = prev_start[i];
            }

            cur_cost[i] = cost;
            cur_start[i] = start;
        }

        let score = compute_score(cur_cost[m], m, cur_start[m], options);
        if best.map_or(true, |current| score < current) {
            best = Some(score);
        }

        std::mem::swap(&mut prev_cost, &mut cur_cost);
        std::mem::swap(&mut prev_start, &mut cur_start);
    }

    best.filter(|score| *score <= options.threshold)
}

fn compute_score(errors: usize, pattern_len: usize, start: usize, options: &SearchConfig) -> f64 {
    let accuracy = errors as f64 / pattern_len as f64;
    if options.ignore_location {
        return accuracy;
    }

    let proximity = start.abs_diff(options.location);
    if options.distance == 0 {
        return if proximity == 0 { accuracy } else { 1.0 };
    }

    accuracy + proximity as f64 / options.distance as f64
}
