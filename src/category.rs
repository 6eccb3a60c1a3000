// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Fixed keyword groups behind the Ad Library category search.

use std::str::FromStr;

use crate::normalize::UnknownOption;

/// Keywords searched per category; the rest of each group is never sent.
pub const KEYWORDS_PER_SEARCH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdCategory {
    Tecnologia,
    Moda,
    Saude,
    Educacao,
    Financas,
    Casa,
}

impl AdCategory {
    pub const ALL: [AdCategory; 6] = [
        AdCategory::Tecnologia,
        AdCategory::Moda,
        AdCategory::Saude,
        AdCategory::Educacao,
        AdCategory::Financas,
        AdCategory::Casa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AdCategory::Tecnologia => "tecnologia",
            AdCategory::Moda => "moda",
            AdCategory::Saude => "saude",
            AdCategory::Educacao => "educacao",
            AdCategory::Financas => "financas",
            AdCategory::Casa => "casa",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            AdCategory::Tecnologia => &["iphone", "samsung", "notebook", "smartphone"],
            AdCategory::Moda => &["roupa", "sapato", "bolsa", "acessorio"],
            AdCategory::Saude => &["suplemento", "vitamina", "academia", "dieta"],
            AdCategory::Educacao => &["curso", "faculdade", "ingles", "concurso"],
            AdCategory::Financas => &["investimento", "cartao", "emprestimo", "bitcoin"],
            AdCategory::Casa => &["moveis", "decoracao", "eletrodomestico", "casa"],
        }
    }

    pub fn searched_keywords(self) -> &'static [&'static str] {
        let keywords = self.keywords();
        &keywords[..KEYWORDS_PER_SEARCH.min(keywords.len())]
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::ALL.iter().map(|c| c.as_str())
    }
}

impl FromStr for AdCategory {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| UnknownOption::new(s))
    }
}

/// Per-keyword page size: the requested total split across the searched
/// keywords, never below one.
pub fn per_keyword_limit(total: u32) -> u32 {
    (total / KEYWORDS_PER_SEARCH as u32).max(1)
}
