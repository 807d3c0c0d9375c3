//! Vocabulary, labels and hashed subword features.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::args::{Args, ModelKind};
use crate::error::{Error, Result};
use crate::reader::{TokenReader, EOS};
use crate::real;

/// Begin-of-word marker added before computing character n-grams.
pub const BOW: &str = "<";
/// End-of-word marker.
pub const EOW: &str = ">";

/// Separator written for each skipped character in a skip-pattern subword.
pub const SKIP_MARK: char = '.';

const MAX_VOCAB_SIZE: usize = 30_000_000;
const MAX_LINE_SIZE: u64 = 1024;

/// Multiplier used to combine word hashes into word n-gram hashes.
const WORD_NGRAM_MULTIPLIER: u64 = 116_049_371;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryType {
    Word,
    Label,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub word: String,
    pub count: u64,
    pub kind: EntryType,
    /// Input-matrix rows that make up this word's vector, starting with the
    /// word's own id. Rebuilt after loading.
    #[serde(skip)]
    subwords: Vec<usize>,
}

/// The part of a dictionary that's written to a model file.
#[derive(Serialize, Deserialize)]
struct Saved {
    ntokens: u64,
    entries: Vec<Entry>,
}

/// 32-bit FNV-1a over the bytes of `s`.
///
/// Bytes are sign-extended before mixing, as a signed C `char` would be.
/// This only matters for non-ASCII text.
pub fn hash(s: &str) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for &b in s.as_bytes() {
        h ^= b as i8 as u32;
        h = h.wrapping_mul(16_777_619);
    }
    h
}

pub struct Dictionary {
    args: Arc<Args>,
    word2int: HashMap<String, usize>,
    words: Vec<Entry>,
    /// Probability of keeping each word when subsampling.
    pdiscard: Vec<real>,
    nwords: usize,
    nlabels: usize,
    /// Number of tokens seen in the training corpus, end-of-line markers excluded.
    ntokens: u64,
}

impl Dictionary {
    pub fn new(args: Arc<Args>) -> Self {
        Dictionary {
            args,
            word2int: HashMap::new(),
            words: Vec::new(),
            pdiscard: Vec::new(),
            nwords: 0,
            nlabels: 0,
            ntokens: 0,
        }
    }

    pub fn nwords(&self) -> usize {
        self.nwords
    }

    pub fn nlabels(&self) -> usize {
        self.nlabels
    }

    pub fn ntokens(&self) -> u64 {
        self.ntokens
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Returns the id of a word or label, if it's in the dictionary.
    pub fn id(&self, word: &str) -> Option<usize> {
        self.word2int.get(word).copied()
    }

    pub fn word(&self, id: usize) -> &str {
        &self.words[id].word
    }

    pub fn kind(&self, id: usize) -> EntryType {
        self.words[id].kind
    }

    /// The text of label number `lid` (counting from the first label).
    pub fn label(&self, lid: usize) -> &str {
        assert!(lid < self.nlabels, "label id {lid} out of range");
        &self.words[lid + self.nwords].word
    }

    fn kind_of(&self, token: &str) -> EntryType {
        if token.starts_with(&self.args.label) {
            EntryType::Label
        } else {
            EntryType::Word
        }
    }

    /// Counts for every entry of the given kind, in id order.
    pub fn counts(&self, kind: EntryType) -> Vec<u64> {
        self.words
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.count)
            .collect()
    }

    /// Count one occurrence of `token`. End-of-line markers are ignored.
    pub fn add_token(&mut self, token: &str) {
        if token == EOS {
            return;
        }
        self.ntokens += 1;
        if let Some(&i) = self.word2int.get(token) {
            self.words[i].count += 1;
            return;
        }
        let kind = self.kind_of(token);
        self.word2int.insert(token.to_string(), self.words.len());
        self.words.push(Entry {
            word: token.to_string(),
            count: 1,
            kind,
            subwords: Vec::new(),
        });
    }

    /// Count every token in `reader`, then [`build`](Self::build).
    pub fn read<R: BufRead>(&mut self, reader: &mut TokenReader<R>) -> Result<()> {
        let mut min_threshold = 1;
        while let Some(token) = reader.next_token()? {
            self.add_token(&token);
            if self.ntokens % 1_000_000 == 0 && token != EOS {
                debug!("read {}M words", self.ntokens / 1_000_000);
            }
            if self.words.len() as f64 > 0.75 * MAX_VOCAB_SIZE as f64 {
                min_threshold += 1;
                self.threshold(min_threshold, min_threshold);
            }
        }
        self.build()?;
        info!(
            "read {} words: {} in vocabulary, {} labels",
            self.ntokens, self.nwords, self.nlabels
        );
        Ok(())
    }

    /// Finish the vocabulary: sort, drop rare entries, and precompute
    /// subsampling probabilities and subwords.
    pub fn build(&mut self) -> Result<()> {
        self.threshold(self.args.min_count, self.args.min_count_label);
        if self.words.is_empty() {
            return Err(Error::Data(
                "empty vocabulary; try a smaller minCount value".to_string(),
            ));
        }
        if self.nwords == 0 {
            return Err(Error::Data("the vocabulary contains no words".to_string()));
        }
        if self.args.model == ModelKind::Supervised && self.nlabels == 0 {
            return Err(Error::Data(format!(
                "no labels found; every training example needs a label starting with {:?}",
                self.args.label
            )));
        }
        self.init_discard();
        self.init_subwords();
        Ok(())
    }

    /// Sort by kind and descending count, then drop words seen fewer than
    /// `t` times and labels seen fewer than `tl` times. The sort is stable,
    /// so ties keep the order in which entries were first seen.
    fn threshold(&mut self, t: u64, tl: u64) {
        self.words.sort_by_key(|e| (e.kind, Reverse(e.count)));
        self.words.retain(|e| match e.kind {
            EntryType::Word => e.count >= t,
            EntryType::Label => e.count >= tl,
        });
        self.words.shrink_to_fit();
        self.reindex();
    }

    fn reindex(&mut self) {
        self.word2int.clear();
        self.nwords = 0;
        self.nlabels = 0;
        for (i, e) in self.words.iter().enumerate() {
            self.word2int.insert(e.word.clone(), i);
            match e.kind {
                EntryType::Word => self.nwords += 1,
                EntryType::Label => self.nlabels += 1,
            }
        }
    }

    fn init_discard(&mut self) {
        let t = self.args.t;
        let ntokens = self.ntokens.max(1) as f64;
        self.pdiscard = self
            .words
            .iter()
            .map(|e| {
                let f = e.count as f64 / ntokens;
                ((t / f).sqrt() + t / f).clamp(0.0, 1.0) as real
            })
            .collect();
    }

    /// Labels have no input rows, so their subword lists stay empty.
    fn init_subwords(&mut self) {
        for i in 0..self.words.len() {
            let mut subwords = vec![];
            if self.words[i].kind == EntryType::Word {
                subwords.push(i);
                let padded = format!("{BOW}{}{EOW}", self.words[i].word);
                self.compute_subwords(&padded, &mut subwords, None);
            }
            self.words[i].subwords = subwords;
        }
    }

    /// The id of `word` if it is a vocabulary word, not a label.
    fn word_id(&self, word: &str) -> Option<usize> {
        self.id(word).filter(|&id| id < self.nwords)
    }

    /// Should this occurrence of `id` be dropped? `rand` is uniform in `[0, 1)`.
    pub fn discard(&self, id: usize, rand: real) -> bool {
        match self.args.model {
            ModelKind::Supervised => false,
            _ => rand > self.pdiscard[id],
        }
    }

    fn push_hash(&self, out: &mut Vec<usize>, h: u64) {
        if self.args.bucket > 0 {
            out.push(self.nwords + (h % self.args.bucket as u64) as usize);
        }
    }

    /// Append the bucket ids of every character n-gram of `padded` (a word
    /// wrapped in [`BOW`] and [`EOW`]), and optionally the n-gram strings.
    fn compute_subwords(
        &self,
        padded: &str,
        out: &mut Vec<usize>,
        mut substrings: Option<&mut Vec<String>>,
    ) {
        let (minn, maxn) = (self.args.minn, self.args.maxn);
        if maxn == 0 || self.args.bucket == 0 {
            return;
        }

        // Byte offset of each character, plus the end of the string.
        let bounds: Vec<usize> = padded
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(padded.len()))
            .collect();
        let nchars = bounds.len() - 1;

        for i in 0..nchars {
            for n in 1..=maxn {
                if i + n > nchars {
                    break;
                }
                // A lone boundary marker carries no information.
                if n < minn || (n == 1 && (i == 0 || i + n == nchars)) {
                    continue;
                }
                let ngram = &padded[bounds[i]..bounds[i + n]];
                self.push_hash(out, hash(ngram) as u64);
                if let Some(strings) = substrings.as_deref_mut() {
                    strings.push(ngram.to_string());
                }
            }
        }

        if self.args.max_skip > 0 && nchars > 2 {
            let inner: Vec<char> = padded.chars().skip(1).take(nchars - 2).collect();
            for pattern in skip_patterns(&inner, minn, maxn, self.args.max_skip) {
                self.push_hash(out, hash(&pattern) as u64);
                if let Some(strings) = substrings.as_deref_mut() {
                    strings.push(pattern);
                }
            }
        }
    }

    /// The input rows for a vocabulary word: its own id followed by its subwords.
    pub fn subwords_of(&self, id: usize) -> &[usize] {
        &self.words[id].subwords
    }

    /// The input rows that make up the vector for `word`, which need not be
    /// in the vocabulary. Labels are hashed like unknown words.
    pub fn subwords(&self, word: &str) -> Vec<usize> {
        if let Some(id) = self.word_id(word) {
            return self.words[id].subwords.clone();
        }
        let mut out = vec![];
        if word != EOS {
            self.compute_subwords(&format!("{BOW}{word}{EOW}"), &mut out, None);
        }
        out
    }

    /// Like [`subwords`](Self::subwords), paired with the text of each subword.
    pub fn subwords_with_strings(&self, word: &str) -> Vec<(usize, String)> {
        let mut ids = vec![];
        let mut strings = vec![];
        if let Some(id) = self.word_id(word) {
            ids.push(id);
            strings.push(self.words[id].word.clone());
        }
        if word != EOS {
            self.compute_subwords(&format!("{BOW}{word}{EOW}"), &mut ids, Some(&mut strings));
        }
        ids.into_iter().zip(strings).collect()
    }

    /// Hash runs of up to `n` consecutive words into buckets.
    fn add_word_ngrams(&self, line: &mut Vec<usize>, hashes: &[i32], n: usize) {
        for i in 0..hashes.len() {
            let mut h = hashes[i] as i64 as u64;
            for &next in hashes.iter().take(i + n).skip(i + 1) {
                h = h
                    .wrapping_mul(WORD_NGRAM_MULTIPLIER)
                    .wrapping_add(next as i64 as u64);
                self.push_hash(line, h);
            }
        }
    }

    fn add_subwords(&self, line: &mut Vec<usize>, token: &str, wid: Option<usize>) {
        match wid {
            None => {
                if token != EOS {
                    self.compute_subwords(&format!("{BOW}{token}{EOW}"), line, None);
                }
            }
            Some(wid) if self.args.maxn == 0 => line.push(wid),
            Some(wid) => line.extend_from_slice(self.subwords_of(wid)),
        }
    }

    /// Read one line of an unsupervised corpus into `words`.
    ///
    /// Unknown tokens are skipped and frequent words are randomly
    /// subsampled. Returns the number of known tokens read, which is what the
    /// learning rate schedule counts.
    pub fn get_line<R: BufRead>(
        &self,
        reader: &mut TokenReader<R>,
        words: &mut Vec<usize>,
        rng: &mut impl Rng,
    ) -> io::Result<u64> {
        words.clear();
        let mut ntokens = 0;
        while let Some(token) = reader.next_token()? {
            if token == EOS {
                break;
            }
            let Some(wid) = self.id(&token) else {
                continue;
            };
            ntokens += 1;
            if self.kind(wid) == EntryType::Word && !self.discard(wid, rng.gen::<real>()) {
                words.push(wid);
            }
            if ntokens > MAX_LINE_SIZE {
                break;
            }
        }
        Ok(ntokens)
    }

    /// Read one line of a labeled corpus.
    ///
    /// `words` receives the input rows of every word feature (subwords and
    /// word n-grams included), `labels` the label ids. Returns the number of
    /// tokens read.
    pub fn get_labeled_line<R: BufRead>(
        &self,
        reader: &mut TokenReader<R>,
        words: &mut Vec<usize>,
        labels: &mut Vec<usize>,
    ) -> io::Result<u64> {
        words.clear();
        labels.clear();
        let mut word_hashes: Vec<i32> = vec![];
        let mut ntokens = 0;
        while let Some(token) = reader.next_token()? {
            if token == EOS {
                break;
            }
            let h = hash(&token);
            let wid = self.id(&token);
            let kind = match wid {
                Some(wid) => self.kind(wid),
                None => self.kind_of(&token),
            };
            ntokens += 1;
            match (kind, wid) {
                (EntryType::Word, _) => {
                    self.add_subwords(words, &token, wid);
                    word_hashes.push(h as i32);
                }
                (EntryType::Label, Some(wid)) => labels.push(wid - self.nwords),
                (EntryType::Label, None) => {}
            }
        }
        self.add_word_ngrams(words, &word_hashes, self.args.word_ngrams);
        Ok(ntokens)
    }

    /// Merge in the words of a pretrained vector file so they get their own rows.
    pub fn add_pretrained<'a>(&mut self, words: impl IntoIterator<Item = &'a str>) {
        let ntokens = self.ntokens;
        for word in words {
            self.add_token(word);
        }
        self.ntokens = ntokens;
        self.threshold(1, 0);
        self.init_discard();
        self.init_subwords();
    }

    pub fn save(&self, out: &mut impl Write) -> bincode::Result<()> {
        bincode::serialize_into(
            out,
            &Saved {
                ntokens: self.ntokens,
                entries: self.words.clone(),
            },
        )
    }

    pub fn load(args: Arc<Args>, input: &mut impl Read) -> bincode::Result<Self> {
        let saved: Saved = bincode::deserialize_from(input)?;
        let mut dict = Dictionary::new(args);
        dict.ntokens = saved.ntokens;
        dict.words = saved.entries;
        dict.reindex();
        dict.init_discard();
        dict.init_subwords();
        Ok(dict)
    }

    pub fn dump(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}", self.words.len())?;
        for e in &self.words {
            let kind = match e.kind {
                EntryType::Word => "word",
                EntryType::Label => "label",
            };
            writeln!(out, "{} {} {}", e.word, e.count, kind)?;
        }
        Ok(())
    }
}

/// Non-contiguous character subsequences that approximate root-and-pattern
/// morphology.
///
/// For each gap `g` in `1..=max_skip` and each length `n` in
/// `max(2, minn)..=maxn`, takes every run of `n` characters spaced `g + 1`
/// apart. The skipped characters are written as `g` copies of
/// [`SKIP_MARK`], so `kataba` yields `k.t.b` for `g = 1, n = 3`.
pub fn skip_patterns(chars: &[char], minn: usize, maxn: usize, max_skip: usize) -> Vec<String> {
    let mut out = vec![];
    for gap in 1..=max_skip {
        let stride = gap + 1;
        for n in minn.max(2)..=maxn {
            let span = (n - 1) * stride + 1;
            if span > chars.len() {
                break;
            }
            for start in 0..=(chars.len() - span) {
                let mut pattern = String::new();
                for k in 0..n {
                    if k > 0 {
                        pattern.extend(std::iter::repeat(SKIP_MARK).take(gap));
                    }
                    pattern.push(chars[start + k * stride]);
                }
                out.push(pattern);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn args(model: ModelKind) -> Args {
        Args {
            min_count: 1,
            bucket: 1000,
            ..Args::new(model)
        }
    }

    fn build(args: Args, corpus: &str) -> Result<Dictionary> {
        let mut dict = Dictionary::new(Arc::new(args));
        dict.read(&mut TokenReader::new(corpus.as_bytes()))?;
        Ok(dict)
    }

    #[test]
    fn fnv_hash() {
        assert_eq!(hash(""), 2_166_136_261);
        assert_eq!(hash("a"), 0xe40c_292c);
        assert_eq!(hash("<wh"), hash("<wh"));
        assert_ne!(hash("<wh"), hash("wh>"));
    }

    #[test]
    fn sorted_by_count_then_first_appearance() {
        let dict = build(args(ModelKind::Skipgram), "c a b\nb c d\nb __label__x\n").unwrap();
        let order: Vec<&str> = (0..dict.nwords() + dict.nlabels())
            .map(|i| dict.word(i))
            .collect();
        assert_eq!(order, ["b", "c", "a", "d", "__label__x"]);
        assert_eq!(dict.nwords(), 4);
        assert_eq!(dict.nlabels(), 1);
        assert_eq!(dict.ntokens(), 8);
        assert_eq!(dict.label(0), "__label__x");
        assert_eq!(dict.counts(EntryType::Word), [3, 2, 1, 1]);
        assert_eq!(dict.id(EOS), None);
    }

    #[test]
    fn building_twice_gives_the_same_ids() {
        let corpus = "the cat sat on the mat\nthe dog sat\nan owl\n";
        let a = build(args(ModelKind::Cbow), corpus).unwrap();
        let b = build(args(ModelKind::Cbow), corpus).unwrap();
        for i in 0..a.nwords() {
            assert_eq!(a.word(i), b.word(i));
            assert_eq!(a.subwords_of(i), b.subwords_of(i));
        }
    }

    #[test]
    fn thresholds_drop_rare_entries() {
        let a = Args {
            min_count: 2,
            min_count_label: 2,
            ..args(ModelKind::Supervised)
        };
        let dict = build(a, "x y __label__a\nx __label__a\ny __label__b\nz\n").unwrap();
        assert_eq!(dict.nwords(), 2);
        assert_eq!(dict.nlabels(), 1);
        assert_eq!(dict.id("z"), None);
        assert_eq!(dict.id("__label__b"), None);
    }

    #[test]
    fn empty_corpus_is_an_error() {
        assert!(matches!(build(args(ModelKind::Skipgram), ""), Err(Error::Data(_))));
        assert!(matches!(
            build(args(ModelKind::Skipgram), "\n\n"),
            Err(Error::Data(_))
        ));
        let too_rare = Args {
            min_count: 5,
            ..args(ModelKind::Skipgram)
        };
        assert!(matches!(build(too_rare, "a b c\n"), Err(Error::Data(_))));
    }

    #[test]
    fn supervised_needs_labels() {
        let err = build(args(ModelKind::Supervised), "no labels here\n").err().unwrap();
        assert!(matches!(err, Error::Data(ref m) if m.contains("__label__")), "{err}");
    }

    #[test]
    fn keep_probabilities() {
        let a = Args {
            t: 0.01,
            ..args(ModelKind::Skipgram)
        };
        // "a" has frequency 0.9, "b" 0.1.
        let dict = build(a, "a a a a a a a a a b\n").unwrap();
        let pa = dict.pdiscard[dict.id("a").unwrap()];
        let pb = dict.pdiscard[dict.id("b").unwrap()];
        let expected = |f: f64| ((0.01 / f).sqrt() + 0.01 / f) as real;
        assert!((pa - expected(0.9)).abs() < 1e-6);
        assert!((pb - expected(0.1)).abs() < 1e-6);
        assert!(pa < pb);
        assert!(dict.discard(dict.id("a").unwrap(), 0.99));
        assert!(!dict.discard(dict.id("a").unwrap(), 0.0));
    }

    #[test]
    fn character_ngrams() {
        let a = Args {
            minn: 3,
            maxn: 3,
            ..args(ModelKind::Skipgram)
        };
        let dict = build(a, "where\n").unwrap();
        let strings: Vec<String> = dict
            .subwords_with_strings("where")
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        assert_eq!(strings, ["where", "<wh", "whe", "her", "ere", "re>"]);

        let ids = dict.subwords("where");
        assert_eq!(ids[0], 0);
        assert_eq!(ids.len(), 6);
        assert!(ids[1..].iter().all(|&i| i >= dict.nwords() && i < dict.nwords() + 1000));
        assert_eq!(ids[1], dict.nwords() + (hash("<wh") % 1000) as usize);

        // Out of vocabulary: n-grams only.
        let oov = dict.subwords("wherever");
        assert_eq!(oov.len(), 8);
        assert_eq!(oov[0], ids[1]);
    }

    #[test]
    fn ngrams_respect_utf8_boundaries() {
        let a = Args {
            minn: 1,
            maxn: 2,
            ..args(ModelKind::Skipgram)
        };
        let dict = build(a, "été\n").unwrap();
        let strings: Vec<String> = dict
            .subwords_with_strings("été")
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        assert_eq!(
            strings,
            ["été", "<é", "é", "ét", "t", "té", "é", "é>"]
        );
    }

    #[test]
    fn no_subwords_when_maxn_is_zero() {
        let a = Args {
            maxn: 0,
            ..args(ModelKind::Skipgram)
        };
        let dict = build(a, "alpha beta\n").unwrap();
        assert_eq!(dict.subwords("alpha"), [0]);
        assert!(dict.subwords("gamma").is_empty());
    }

    #[test]
    fn skip_pattern_extraction() {
        let chars: Vec<char> = "kataba".chars().collect();
        let patterns = skip_patterns(&chars, 3, 3, 1);
        assert_eq!(patterns, ["k.t.b", "a.a.a"]);

        let patterns = skip_patterns(&chars, 1, 2, 2);
        assert!(patterns.contains(&"k.t".to_string()));
        assert!(patterns.contains(&"k..a".to_string()));
        assert_eq!(patterns.len(), 4 + 3);

        assert!(skip_patterns(&chars, 3, 6, 0).is_empty());
        assert!(skip_patterns(&['a', 'b'], 2, 3, 1).is_empty());
    }

    #[test]
    fn skip_patterns_are_subwords() {
        let a = Args {
            minn: 3,
            maxn: 3,
            max_skip: 1,
            ..args(ModelKind::Skipgram)
        };
        let dict = build(a, "kataba\n").unwrap();
        let strings: Vec<String> = dict
            .subwords_with_strings("kitab")
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        assert!(strings.contains(&"k.t.b".to_string()), "{strings:?}");
        let shared = dict.subwords("kataba");
        let kitab = dict.subwords("kitab");
        assert!(kitab.iter().any(|i| shared.contains(i)));
    }

    #[test]
    fn unsupervised_lines() {
        let a = Args {
            t: 1.0,
            ..args(ModelKind::Skipgram)
        };
        let dict = build(a, "a b c\nb c d\n").unwrap();
        let mut reader = TokenReader::new("a b zzz c\nd\n".as_bytes());
        let mut rng = StdRng::seed_from_u64(0);
        let mut words = vec![];

        let n = dict.get_line(&mut reader, &mut words, &mut rng).unwrap();
        assert_eq!(n, 3);
        let text: Vec<&str> = words.iter().map(|&i| dict.word(i)).collect();
        assert_eq!(text, ["a", "b", "c"]);

        assert_eq!(dict.get_line(&mut reader, &mut words, &mut rng).unwrap(), 1);
        assert_eq!(dict.get_line(&mut reader, &mut words, &mut rng).unwrap(), 0);
        assert!(reader.is_eof());
    }

    #[test]
    fn labeled_lines() {
        let a = Args {
            word_ngrams: 2,
            ..args(ModelKind::Supervised)
        };
        let dict = build(a, "good movie __label__pos\nbad movie __label__neg\n").unwrap();
        let mut reader =
            TokenReader::new("good unseen movie __label__pos __label__new\n".as_bytes());
        let (mut words, mut labels) = (vec![], vec![]);
        let n = dict
            .get_labeled_line(&mut reader, &mut words, &mut labels)
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(labels.len(), 1);
        assert_eq!(dict.label(labels[0]), "__label__pos");
        // Two known words plus two bigrams; the unknown word has no subwords
        // but still takes part in the bigrams.
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], dict.id("good").unwrap());
        assert_eq!(words[1], dict.id("movie").unwrap());
        assert!(words[2..].iter().all(|&i| i >= dict.nwords()));
    }

    #[test]
    fn labels_have_no_input_rows() {
        let a = Args {
            bucket: 100,
            minn: 2,
            maxn: 3,
            ..args(ModelKind::Supervised)
        };
        let dict = build(a, "good movie __label__pos\n").unwrap();
        let lid = dict.id("__label__pos").unwrap();
        assert!(dict.subwords_of(lid).is_empty());

        let ids = dict.subwords("__label__pos");
        assert!(!ids.contains(&lid));
        assert!(ids.iter().all(|&i| i >= dict.nwords()));
        assert!(dict
            .subwords_with_strings("__label__pos")
            .iter()
            .all(|(i, s)| *i >= dict.nwords() && s != "__label__pos"));

        let dict = build(args(ModelKind::Supervised), "good movie __label__pos\n").unwrap();
        assert!(dict.subwords("__label__pos").is_empty());
        assert!(dict.subwords_with_strings("__label__pos").is_empty());
    }

    #[test]
    fn save_and_load() {
        let a = Arc::new(Args {
            minn: 2,
            maxn: 4,
            ..args(ModelKind::Supervised)
        });
        let mut dict = Dictionary::new(a.clone());
        dict.read(&mut TokenReader::new("hello world __label__greeting\n".as_bytes()))
            .unwrap();
        let mut bytes = vec![];
        dict.save(&mut bytes).unwrap();

        let loaded = Dictionary::load(a, &mut bytes.as_slice()).unwrap();
        assert_eq!(loaded.nwords(), dict.nwords());
        assert_eq!(loaded.nlabels(), dict.nlabels());
        assert_eq!(loaded.ntokens(), dict.ntokens());
        for i in 0..dict.nwords() {
            assert_eq!(loaded.word(i), dict.word(i));
            assert_eq!(loaded.subwords_of(i), dict.subwords_of(i));
        }

        assert!(Dictionary::load(Arc::new(Args::default()), &mut &bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn pretrained_words_are_added() {
        let mut dict = build(args(ModelKind::Skipgram), "a b\n").unwrap();
        dict.add_pretrained(["b", "z"]);
        assert_eq!(dict.nwords(), 3);
        assert_eq!(dict.id("b"), Some(0));
        assert!(dict.id("z").is_some());
        assert_eq!(dict.ntokens(), 2);
    }
}
