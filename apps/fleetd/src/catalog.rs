//! Static equipment knowledge: set membership, set ranks, per-class
//! recommended combos, and the slot-name normalization rules.

/// Canonical outfit slots, in placement order.
pub const SLOT_ORDER: [&str; 8] = [
    "头", "项链", "腰带", "鞋子", "手镯1", "手镯2", "戒指1", "戒指2",
];

/// Special item: goes to the outfit's side channel, not an 8-slot.
pub const XUANYUAN_HEART: &str = "轩辕之心";

/// Sets with rank >= 70 count as A-tier.
pub const A_TIER_RANK: i64 = 70;

pub struct SetDef {
    pub name: &'static str,
    pub rank: i64,
    pub pieces: &'static [&'static str],
}

pub const SETS: &[SetDef] = &[
    SetDef {
        name: "天尊套",
        rank: 92,
        pieces: &["天尊头盔", "天尊项链", "天尊腰带", "天尊道靴", "天尊手镯", "天尊戒指"],
    },
    SetDef {
        name: "法神套",
        rank: 90,
        pieces: &["法神头盔", "法神项链", "法神腰带", "法神法靴", "法神手镯", "法神戒指"],
    },
    SetDef {
        name: "圣战套",
        rank: 88,
        pieces: &["圣战头盔", "圣战项链", "圣战腰带", "圣战战靴", "圣战手镯", "圣战戒指"],
    },
    SetDef {
        name: "天机套",
        rank: 78,
        pieces: &[
            "天机头盔", "天机项链", "天机腰带", "天机靴",
            "天机手镯", "天机龙纹手镯", "天机戒指", "天机魔血戒指",
        ],
    },
    SetDef {
        name: "疾风套",
        rank: 75,
        pieces: &[
            "疾风头盔", "疾风项链", "疾风腰带", "疾风鞋",
            "疾风手镯", "疾风流云手镯", "疾风戒指", "疾风踏月戒指",
        ],
    },
    SetDef {
        name: "祖玛套",
        rank: 70,
        pieces: &["祖玛头盔", "祖玛项链", "祖玛腰带", "祖玛靴子", "祖玛手镯", "祖玛戒指"],
    },
    SetDef {
        name: "祝福套",
        rank: 66,
        pieces: &["祝福项链", "祝福手镯", "祝福金手镯", "祝福戒指", "祝福银戒指"],
    },
    SetDef {
        name: "记忆套",
        rank: 60,
        pieces: &["记忆头盔", "记忆项链", "记忆手镯", "记忆戒指"],
    },
    SetDef {
        name: "沃玛套",
        rank: 50,
        pieces: &["沃玛头盔", "沃玛项链", "沃玛腰带", "沃玛手镯"],
    },
];

pub fn set_by_name(name: &str) -> Option<&'static SetDef> {
    SETS.iter().find(|s| s.name == name)
}

pub fn set_rank(name: &str) -> i64 {
    set_by_name(name).map(|s| s.rank).unwrap_or(0)
}

/// Which set an item belongs to, if any.
pub fn set_of_item(item: &str) -> Option<&'static str> {
    SETS.iter()
        .find(|s| s.pieces.contains(&item))
        .map(|s| s.name)
}

pub fn all_sets_except(exclude: &[&str]) -> Vec<&'static str> {
    SETS.iter()
        .map(|s| s.name)
        .filter(|n| !exclude.contains(n))
        .collect()
}

/// Guess an item's slot category from its name. The substring precedence
/// (头 before 项链 etc.) is load-bearing: 头盔 must resolve before any
/// other rule can see the name.
pub fn guess_slot(name: &str) -> Option<&'static str> {
    if name.contains("头盔") || name.contains('头') {
        Some("头")
    } else if name.contains("项链") {
        Some("项链")
    } else if name.contains("腰带") {
        Some("腰带")
    } else if name.contains('靴') || name.contains('鞋') {
        Some("鞋子")
    } else if name.contains("手镯") {
        Some("手镯")
    } else if name.contains("戒指") {
        Some("戒指")
    } else {
        None
    }
}

/// Normalize a reported slot name to its category: the two bracelet slots
/// collapse to 手镯, rings to 戒指, and loose names (道靴/法靴, anything
/// containing a category word) map by the same substring precedence as
/// [`guess_slot`]. Unknown names pass through unchanged.
pub fn normalize_slot(slot: &str) -> &str {
    let s = slot.trim();
    match s {
        "手镯1" | "手镯2" => return "手镯",
        "戒指1" | "戒指2" => return "戒指",
        _ => {}
    }
    if s.contains('头') {
        "头"
    } else if s.contains("项链") {
        "项链"
    } else if s.contains("腰带") {
        "腰带"
    } else if s.contains('靴') || s.contains('鞋') {
        "鞋子"
    } else if s.contains("手镯") {
        "手镯"
    } else if s.contains("戒指") {
        "戒指"
    } else {
        s
    }
}

/// Per-class outfit strategy: primary-set lists for the k主体 segments and
/// an ordered list of combos to try when filling to eight.
pub struct Strategy {
    pub pri1: &'static [&'static str],
    pub pri2: &'static [&'static str],
    pub pri3: &'static [&'static str],
    pub pri4: &'static [&'static str],
    pub combos: &'static [&'static [&'static str]],
}

static WARRIOR: Strategy = Strategy {
    pri1: &["圣战套", "祖玛套"],
    pri2: &["圣战套", "祖玛套", "记忆套"],
    pri3: &["圣战套", "祖玛套"],
    pri4: &["圣战套"],
    combos: &[
        &["4主体", "3天机/疾风", "1轩辕之心"],
        &["4主体", "2祝福", "2其他主体"],
        &["4主体", "3疾风", "1主体"],
        &["4主体", "2其他主体", "2祝福"],
    ],
};

static MAGE: Strategy = Strategy {
    pri1: &["法神套"],
    pri2: &["法神套", "记忆套", "沃玛套"],
    pri3: &["法神套", "记忆套"],
    pri4: &["法神套"],
    combos: &[
        &["4主体", "3天机", "1轩辕之心"],
        &["4主体", "3天机/疾风", "1主体"],
        &["4主体", "2祝福", "2其他主体"],
    ],
};

static TAOIST: Strategy = Strategy {
    pri1: &["天尊套"],
    pri2: &["天尊套", "记忆套"],
    pri3: &["天尊套", "祖玛套"],
    pri4: &["天尊套"],
    combos: &[
        &["4主体", "3天机/疾风", "1轩辕之心"],
        &["4主体", "2祝福", "2其他主体"],
        &["4主体", "3疾风", "1主体"],
    ],
};

pub fn strategy_for(class: &str) -> Option<&'static Strategy> {
    match class {
        "战士" => Some(&WARRIOR),
        "法师" => Some(&MAGE),
        "道士" => Some(&TAOIST),
        _ => None,
    }
}
