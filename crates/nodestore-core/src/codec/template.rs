//! PartitionTemplate - パーティションのマッピング定義（静的設定）
//!
//! エンジンに登録するインデックステンプレートの内容を表します。
//! このクレートはテンプレートをクラスタへ投入しません（プロビジョニングは外部ツールの責務）。
//! コーデックのフィールド名と、InMemoryEngine のエイリアス付与に使います。
//!
//! # フィールド
//! - `data`: ペイロード。保存のみ（index: false, store: true）
//! - `timestamp`: 日付型。保存 + インデックス（リテンション確認・手動調査用）
//! - `encoding`: ペイロードのエンコーディング。保存のみ

use serde_json::json;

pub const DATA_FIELD: &str = "data";
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const ENCODING_FIELD: &str = "encoding";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTemplate {
    pub name: String,
    pub base_name: String,
    pub alias: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

impl PartitionTemplate {
    pub fn new(base_name: impl Into<String>, alias: impl Into<String>) -> Self {
        let base_name = base_name.into();
        Self {
            name: base_name.clone(),
            base_name,
            alias: alias.into(),
            number_of_shards: 3,
            number_of_replicas: 0,
        }
    }

    pub fn index_pattern(&self) -> String {
        format!("{}-*", self.base_name)
    }

    /// Does a newly created partition fall under this template?
    pub fn matches(&self, partition: &str) -> bool {
        partition
            .strip_prefix(self.base_name.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Body of the engine's index-template request.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "index_patterns": [self.index_pattern()],
            "template": {
                "settings": {
                    "index": {
                        "number_of_shards": self.number_of_shards,
                        "number_of_replicas": self.number_of_replicas,
                    }
                },
                "mappings": {
                    "_source": { "enabled": false },
                    "dynamic": "false",
                    "properties": {
                        DATA_FIELD: { "type": "text", "index": false, "store": true },
                        TIMESTAMP_FIELD: { "type": "date", "store": true },
                        ENCODING_FIELD: { "type": "keyword", "index": false, "store": true },
                    }
                },
                "aliases": { self.alias.clone(): {} }
            }
        })
    }
}
