use tantivy::schema::{
    Field, FieldType, IndexRecordOption, JsonObjectOptions, Schema as TantivySchema,
    TextFieldIndexing, TextOptions, FAST, INDEXED, STORED, STRING,
};
use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer,
};
use tantivy::Term;

/// Engine field names. Handlers refer to these when declaring which index
/// field backs them; nothing outside this module spells a field name twice.
pub mod names {
    pub const ID: &str = "id";
    pub const SKU: &str = "sku";
    pub const SORT_SKU: &str = "sort_sku";
    pub const NAME: &str = "name";
    pub const SORT_NAME: &str = "sort_name";
    pub const DESCRIPTION: &str = "description";
    pub const CATALOG: &str = "catalog_id";
    pub const MANUFACTURER: &str = "manufacturer_id";
    pub const COST: &str = "cost";
    pub const LIST_PRICE: &str = "listprice";
    pub const STATUS: &str = "status";
    pub const SORT_STATUS: &str = "sort_status";
    pub const WAS_STATUS: &str = "status_was";
    pub const CREATED: &str = "created";
    pub const UPDATED: &str = "updated";
    pub const CUSTOM: &str = "custom";
    pub const VISIBLE_FIELDS: &str = "visiblefieldids";
    pub const NONEMPTY_FIELDS: &str = "nonemptyfieldids";
    pub const CHANGED_FIELDS: &str = "changed_fields";
}

/// Analyzer for stemmed full-text fields.
pub const TEXT_ANALYZER: &str = "asset_text";
/// Analyzer for the un-stemmed `exact_` shadow fields.
pub const EXACT_ANALYZER: &str = "asset_exact";

/// Every tokenized text field is indexed a second time under this prefix,
/// un-stemmed and with positions, so phrase equality and stemmed matching
/// coexist.
pub const EXACT_PREFIX: &str = "exact_";

const STOP_WORDS: [&str; 33] = [
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// The asset index schema plus the analyzers that produced its terms.
///
/// Query-side code must tokenize literals exactly the way the indexed text
/// was tokenized, so the term helpers here are the only place query text is
/// turned into [`Term`]s.
#[derive(Clone)]
pub struct AssetSchema {
    schema: TantivySchema,
    text_analyzer: TextAnalyzer,
    exact_analyzer: TextAnalyzer,
    id: Field,
    custom: Field,
    visible_fields: Field,
    nonempty_fields: Field,
    changed_fields: Field,
}

impl Default for AssetSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetSchema {
    pub fn new() -> Self {
        let mut builder = TantivySchema::builder();

        let stemmed = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TEXT_ANALYZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let exact = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(EXACT_ANALYZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let id = builder.add_u64_field(names::ID, INDEXED | STORED | FAST);

        // Identifiers match byte for byte; the folded copy is written as a
        // second value of the same field.
        builder.add_text_field(names::SKU, STRING);
        builder.add_text_field(names::SORT_SKU, STRING | STORED);

        builder.add_text_field(names::NAME, stemmed.clone());
        builder.add_text_field(&format!("{}{}", EXACT_PREFIX, names::NAME), exact.clone());
        builder.add_text_field(names::SORT_NAME, STRING | STORED);

        builder.add_text_field(names::DESCRIPTION, stemmed.clone());
        builder.add_text_field(&format!("{}{}", EXACT_PREFIX, names::DESCRIPTION), exact);

        builder.add_u64_field(names::CATALOG, INDEXED | FAST);
        builder.add_u64_field(names::MANUFACTURER, INDEXED | FAST);

        builder.add_f64_field(names::COST, INDEXED | FAST);
        builder.add_f64_field(names::LIST_PRICE, INDEXED | FAST);

        builder.add_text_field(names::STATUS, STRING);
        builder.add_text_field(names::SORT_STATUS, STRING | STORED);
        builder.add_text_field(names::WAS_STATUS, STRING);

        // Canonical timestamps sort and range lexicographically.
        builder.add_text_field(names::CREATED, STRING | STORED);
        builder.add_text_field(names::UPDATED, STRING | STORED);

        let custom_opts = JsonObjectOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TEXT_ANALYZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let custom = builder.add_json_field(names::CUSTOM, custom_opts);

        let visible_fields = builder.add_text_field(names::VISIBLE_FIELDS, STRING);
        let nonempty_fields = builder.add_text_field(names::NONEMPTY_FIELDS, STRING);
        let changed_fields = builder.add_text_field(names::CHANGED_FIELDS, STRING);

        AssetSchema {
            schema: builder.build(),
            text_analyzer: Self::build_text_analyzer(),
            exact_analyzer: Self::build_exact_analyzer(),
            id,
            custom,
            visible_fields,
            nonempty_fields,
            changed_fields,
        }
    }

    fn build_text_analyzer() -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(
                STOP_WORDS.iter().map(|w| w.to_string()),
            ))
            .filter(Stemmer::new(Language::English))
            .build()
    }

    fn build_exact_analyzer() -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .build()
    }

    /// Register both analyzers on an index. Must run on the create path and
    /// the open path alike, or segment merges fail on the missing tokenizer.
    pub fn register_analyzers(&self, index: &tantivy::Index) {
        index
            .tokenizers()
            .register(TEXT_ANALYZER, self.text_analyzer.clone());
        index
            .tokenizers()
            .register(EXACT_ANALYZER, self.exact_analyzer.clone());
    }

    pub fn tantivy(&self) -> &TantivySchema {
        &self.schema
    }

    pub fn id_field(&self) -> Field {
        self.id
    }

    pub fn custom_field(&self) -> Field {
        self.custom
    }

    pub fn visible_fields(&self) -> Field {
        self.visible_fields
    }

    pub fn nonempty_fields(&self) -> Field {
        self.nonempty_fields
    }

    pub fn changed_fields(&self) -> Field {
        self.changed_fields
    }

    pub fn u64_field(&self, name: &str) -> Option<Field> {
        let field = self.schema.get_field(name).ok()?;
        match self.schema.get_field_entry(field).field_type() {
            FieldType::U64(_) => Some(field),
            _ => None,
        }
    }

    pub fn number_field(&self, name: &str) -> Option<Field> {
        let field = self.schema.get_field(name).ok()?;
        match self.schema.get_field_entry(field).field_type() {
            FieldType::F64(_) => Some(field),
            _ => None,
        }
    }

    /// Untokenized string field (identifiers, statuses, timestamps, sort
    /// keys).
    pub fn raw_field(&self, name: &str) -> Option<Field> {
        self.str_field_with_tokenizer(name, "raw")
    }

    /// Stemmed full-text field.
    pub fn text_field(&self, name: &str) -> Option<Field> {
        self.str_field_with_tokenizer(name, TEXT_ANALYZER)
    }

    /// The un-stemmed shadow of a text field, or `None` if the field has no
    /// exact copy.
    pub fn exact_variant(&self, name: &str) -> Option<Field> {
        self.str_field_with_tokenizer(&format!("{}{}", EXACT_PREFIX, name), EXACT_ANALYZER)
    }

    fn str_field_with_tokenizer(&self, name: &str, tokenizer: &str) -> Option<Field> {
        let field = self.schema.get_field(name).ok()?;
        match self.schema.get_field_entry(field).field_type() {
            FieldType::Str(opts) => opts
                .get_indexing_options()
                .filter(|indexing| indexing.tokenizer() == tokenizer)
                .map(|_| field),
            _ => None,
        }
    }

    /// Tokenize query text the way the stemmed fields were indexed.
    pub fn stemmed_terms(&self, field: Field, text: &str) -> Vec<Term> {
        self.text_tokens(text)
            .into_iter()
            .map(|token| Term::from_field_text(field, &token))
            .collect()
    }

    /// Tokenize query text the way the `exact_` fields were indexed.
    pub fn exact_terms(&self, field: Field, text: &str) -> Vec<Term> {
        self.exact_tokens(text)
            .into_iter()
            .map(|token| Term::from_field_text(field, &token))
            .collect()
    }

    /// Terms for a custom field's value, addressed by the field id inside the
    /// shared JSON field.
    pub fn custom_terms(&self, field_id: u64, text: &str) -> Vec<Term> {
        let path = field_id.to_string();
        self.text_tokens(text)
            .into_iter()
            .map(|token| {
                let mut term = Term::from_field_json_path(self.custom, &path, false);
                term.append_type_and_str(&token);
                term
            })
            .collect()
    }

    /// Tokens as the stemming analyzer emits them.
    pub fn text_tokens(&self, text: &str) -> Vec<String> {
        Self::tokenize(&self.text_analyzer, text)
    }

    /// Tokens as the exact analyzer emits them.
    pub fn exact_tokens(&self, text: &str) -> Vec<String> {
        Self::tokenize(&self.exact_analyzer, text)
    }

    fn tokenize(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
        // token_stream needs &mut; the pipeline clone is cheap.
        let mut analyzer = analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }
}

impl std::fmt::Debug for AssetSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetSchema").finish_non_exhaustive()
    }
}
