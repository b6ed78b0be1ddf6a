// パス: src/env.rs
// 役割: セッション中の名前付きオブジェクトを保持する環境
// 意図: 同じ名前の二重束縛を防ぎ、ドライバ切り替え時に無効なオブジェクトを一括で外す
// 関連ファイル: src/object.rs, src/repl/cmd.rs, src/testbench.rs
//! 名前 → オブジェクトの順序付き表。表は小さいので線形探索で引く。

use thiserror::Error;

use crate::object::{Object, ObjectRef};

/// 束縛操作の失敗。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("'{0}' という名前のオブジェクトは既に存在します。先に 'release' で解放してください")]
    AlreadyBound(String),
    #[error("オブジェクト '{0}' が見つかりません")]
    NotFound(String),
}

/// セッションの束縛表。
#[derive(Debug, Default)]
pub struct Environment {
    bindings: Vec<(String, ObjectRef)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.bindings.iter().position(|(bound, _)| bound == name)
    }

    /// 新しい束縛を追加する。既に束縛済みなら失敗する。
    pub fn insert(&mut self, name: impl Into<String>, object: ObjectRef) -> Result<(), BindingError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(BindingError::AlreadyBound(name));
        }
        self.bindings.push((name, object));
        Ok(())
    }

    /// 名前を引き、共有参照を返す。
    pub fn lookup(&self, name: &str) -> Option<ObjectRef> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, object)| ObjectRef::clone(object))
    }

    /// 複数の束縛を外す。未知の名前が 1 つでもあれば何も外さずに失敗する。
    pub fn release<'n, I>(&mut self, names: I) -> Result<usize, BindingError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let names: Vec<&str> = names.into_iter().collect();
        if let Some(missing) = names.iter().find(|name| !self.contains(name)) {
            return Err(BindingError::NotFound(missing.to_string()));
        }
        let before = self.bindings.len();
        self.bindings
            .retain(|(bound, _)| !names.contains(&bound.as_str()));
        Ok(before - self.bindings.len())
    }

    /// 条件に合う束縛をすべて外し、外した数を返す。
    pub fn clear_by_predicate<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&Object) -> bool,
    {
        let before = self.bindings.len();
        self.bindings.retain(|(_, object)| !predicate(object));
        before - self.bindings.len()
    }

    /// ドライバ所有のオブジェクトをすべて外す。
    pub fn clear_driver_objects(&mut self) -> usize {
        self.clear_by_predicate(Object::is_driver_owned)
    }

    /// 挿入順に束縛を辿る。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Object)> {
        self.bindings
            .iter()
            .map(|(name, object)| (name.as_str(), object.as_ref()))
    }
}
