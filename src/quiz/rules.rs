use serde::Serialize;

use super::RuleCategory;

/// One grammar rule with a wrong and a corrected example.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrammarRule {
    pub category: RuleCategory,
    pub principle: &'static str,
    pub explanation: &'static str,
    pub wrong_example: &'static str,
    pub correct_example: &'static str,
}

const fn rule(
    category: RuleCategory,
    principle: &'static str,
    explanation: &'static str,
    wrong_example: &'static str,
    correct_example: &'static str,
) -> GrammarRule {
    GrammarRule {
        category,
        principle,
        explanation,
        wrong_example,
        correct_example,
    }
}

const BUILTIN_RULES: &[GrammarRule] = &[
    rule(
        RuleCategory::DeDae,
        "'데'는 직접 겪은 일, '대'는 전해 들은 일",
        "내가 직접 보거나 겪은 사실을 말할 때는 '-데', 남에게 들은 말을 옮길 때는 '-대'를 써요.",
        "어제 가 보니까 사람이 많대. (직접 본 일)",
        "어제 가 보니까 사람이 많데. / 민수가 그러는데 사람이 많대.",
    ),
    rule(
        RuleCategory::DeDae,
        "'대'는 '-다고 해'의 준말",
        "'-대'를 '-다고 해'로 바꿔도 뜻이 통하면 '대'가 맞아요.",
        "선생님이 내일 쉰데.",
        "선생님이 내일 쉰대. (= 쉰다고 해)",
    ),
    rule(
        RuleCategory::IeyoYeyo,
        "받침이 있으면 '이에요', 없으면 '예요'",
        "앞말에 받침이 있으면 '이에요', 받침이 없으면 '예요'를 붙여요.",
        "저는 학생예요. / 이건 의자이에요.",
        "저는 학생이에요. / 이건 의자예요.",
    ),
    rule(
        RuleCategory::IeyoYeyo,
        "'아니다'는 언제나 '아니에요'",
        "'아니다'의 어간 '아니'에는 '-에요'가 붙어요. 줄이면 '아녜요'예요.",
        "그건 제 책이 아니예요.",
        "그건 제 책이 아니에요. / 아녜요.",
    ),
    rule(
        RuleCategory::EotteokhaeEotteoke,
        "'어떻게'는 방법이나 상태를 물을 때",
        "'어떻게'는 '어떠하게'가 줄어든 말로, 뒤에 동사가 이어져요.",
        "이 문제는 어떡해 풀어요?",
        "이 문제는 어떻게 풀어요?",
    ),
    rule(
        RuleCategory::EotteokhaeEotteoke,
        "'어떡해'는 곤란한 상황의 감탄",
        "'어떡해'는 '어떻게 해'가 줄어든 말로, 문장을 끝맺을 때 써요.",
        "숙제를 두고 왔어. 어떻게!",
        "숙제를 두고 왔어. 어떡해!",
    ),
    rule(
        RuleCategory::DoeDwae,
        "'돼'는 '되어'의 준말",
        "'되어'로 바꿔 말이 되면 '돼'를 써요. '해'를 넣어 자연스러우면 '돼', '하'가 자연스러우면 '되'예요.",
        "그러면 안 되. / 의사가 되서 기뻐요.",
        "그러면 안 돼. / 의사가 돼서 기뻐요.",
    ),
    rule(
        RuleCategory::DoeDwae,
        "어미 '-고', '-는', '-면' 앞에서는 '되'",
        "'되-' 뒤에 바로 다른 어미가 붙으면 '되'를 그대로 써요.",
        "가수가 돼고 싶어요.",
        "가수가 되고 싶어요. / 되면 좋겠어요.",
    ),
    rule(
        RuleCategory::AnAnh,
        "'안'은 용언 앞에 오는 부사",
        "'안'은 '아니'의 준말로, 동사나 형용사 앞에 띄어 써요.",
        "오늘은 않 가요.",
        "오늘은 안 가요.",
    ),
    rule(
        RuleCategory::AnAnh,
        "'않'은 '-지' 뒤에 붙는 '아니하-'",
        "'-지 않다'처럼 '-지' 뒤에서는 '아니하다'의 준말 '않'을 써요.",
        "밥을 먹지 안았어요.",
        "밥을 먹지 않았어요.",
    ),
];

/// Searchable collection of grammar rules.
#[derive(Debug, Clone)]
pub struct RuleBook {
    rules: &'static [GrammarRule],
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleBook {
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_RULES,
        }
    }

    pub fn rules(&self) -> &[GrammarRule] {
        self.rules
    }

    /// Rules whose principle or examples contain `term`, case-insensitively.
    /// A blank term matches nothing.
    pub fn search(&self, term: &str) -> Vec<&GrammarRule> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Vec::new();
        }

        self.rules
            .iter()
            .filter(|r| {
                [r.principle, r.wrong_example, r.correct_example]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            })
            .collect()
    }

    pub fn for_category(&self, category: RuleCategory) -> Vec<&GrammarRule> {
        self.rules.iter().filter(|r| r.category == category).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_rules() {
        let book = RuleBook::builtin();
        for category in RuleCategory::ALL {
            assert!(!book.for_category(category).is_empty(), "{}", category);
        }
    }

    #[test]
    fn test_search_matches_examples() {
        let book = RuleBook::builtin();
        let found = book.search(" 아니에요 ");
        assert!(!found.is_empty());
        assert!(found.iter().all(|r| r.category == RuleCategory::IeyoYeyo));
    }

    #[test]
    fn test_search_matches_principle() {
        let book = RuleBook::builtin();
        let found = book.search("준말");
        assert!(found.iter().any(|r| r.category == RuleCategory::DoeDwae));
    }

    #[test]
    fn test_search_blank_or_unknown() {
        let book = RuleBook::builtin();
        assert!(book.search("   ").is_empty());
        assert!(book.search("띄어쓰기 규칙 없음").is_empty());
    }
}
