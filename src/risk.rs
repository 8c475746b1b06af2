//! Screening questionnaire for nanomaterials in food products
//!
//! Five questions are each answered with one of three fixed options. Every option carries a
//! weight from 1 (least reassuring) to 3 (most reassuring) and the weights add up to a score
//! between 5 and 15. Low scores mean high risk.
//!
//! Options are looked up in the table of the question they answer, so an option text shared by
//! two questions (such as "Tinggi") is weighted independently for each.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Question {
    ToxicityData,
    RegulatoryStatus,
    MigrationPotential,
    ParticleSize,
    NanomaterialContent,
}

impl Question {
    /// The questions in the order they are asked
    pub const ALL: [Self; 5] = [
        Self::ToxicityData,
        Self::RegulatoryStatus,
        Self::MigrationPotential,
        Self::ParticleSize,
        Self::NanomaterialContent,
    ];

    pub const fn prompt(self) -> &'static str {
        match self {
            Self::ToxicityData => "Ketersediaan data toksisitas",
            Self::RegulatoryStatus => "Status regulasi",
            Self::MigrationPotential => "Potensi migrasi ke pangan",
            Self::ParticleSize => "Ukuran partikel primer",
            Self::NanomaterialContent => "Kandungan nanomaterial dalam produk",
        }
    }

    /// Accepted answers and their weights
    pub const fn options(self) -> &'static [(&'static str, u8)] {
        match self {
            Self::ToxicityData => &[("Tidak ada", 1), ("Terbatas", 2), ("Lengkap", 3)],
            Self::RegulatoryStatus => &[("Tidak diatur", 1), ("Dalam kajian", 2), ("Diatur", 3)],
            Self::MigrationPotential => &[("Tinggi", 1), ("Sedang", 2), ("Rendah", 3)],
            Self::ParticleSize => &[("< 20 nm", 1), ("20-100 nm", 2), ("> 100 nm", 3)],
            Self::NanomaterialContent => &[
                ("Tinggi (> 1 mg/g)", 1),
                ("Sedang (0.1-1 mg/g)", 2),
                ("Rendah (< 0.1 mg/g)", 3),
            ],
        }
    }

    /// Weight of `answer`, `None` if it is not one of this question's options
    pub fn weight(self, answer: &str) -> Option<u8> {
        let answer = answer.trim();
        self.options()
            .iter()
            .find(|(option, _)| *option == answer)
            .map(|&(_, weight)| weight)
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prompt())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RiskBand {
    Rendah,
    Sedang,
    Tinggi,
}

impl RiskBand {
    pub const fn from_score(score: u8) -> Self {
        match score {
            0..=5 => Self::Tinggi,
            6..=10 => Self::Sedang,
            _ => Self::Rendah,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Rendah => "RENDAH",
            Self::Sedang => "SEDANG",
            Self::Tinggi => "TINGGI",
        }
    }

    pub const fn advisory(self) -> &'static str {
        match self {
            Self::Rendah => {
                "Risiko rendah. Produk dapat dilanjutkan dengan pemantauan rutin sesuai \
                 regulasi pangan yang berlaku."
            }
            Self::Sedang => {
                "Risiko sedang. Diperlukan kajian toksisitas dan uji migrasi tambahan sebelum \
                 produk dipasarkan."
            }
            Self::Tinggi => {
                "Risiko tinggi. Lakukan evaluasi keamanan menyeluruh dan konsultasikan dengan \
                 otoritas regulasi sebelum produk digunakan."
            }
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An answer that matched none of its question's options and so added nothing to the score
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredAnswer {
    pub question: Question,
    pub answer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RiskAssessment {
    pub score: u8,
    pub band: RiskBand,
    pub ignored: Vec<IgnoredAnswer>,
    /// Questions with no answer at all
    pub unanswered: Vec<Question>,
}

impl RiskAssessment {
    /// True when every question was answered with a recognised option
    pub fn is_complete(&self) -> bool {
        self.ignored.is_empty() && self.unanswered.is_empty()
    }

    pub const fn advisory(&self) -> &'static str {
        self.band.advisory()
    }
}

/// Score answers keyed by the question they answer
///
/// The order of `answers` does not matter. A question answered more than once keeps its last
/// answer.
pub fn assess<'a>(answers: impl IntoIterator<Item = (Question, &'a str)>) -> RiskAssessment {
    let answers: BTreeMap<Question, &str> = answers.into_iter().collect();

    let mut score = 0;
    let mut ignored = vec![];
    for (&question, &answer) in &answers {
        if let Some(weight) = question.weight(answer) {
            score += weight;
        } else {
            warn!(%question, answer, "ignoring unrecognised answer");
            ignored.push(IgnoredAnswer {
                question,
                answer: answer.to_owned(),
            });
        }
    }

    let unanswered = Question::ALL
        .into_iter()
        .filter(|question| !answers.contains_key(question))
        .collect();

    RiskAssessment {
        score,
        band: RiskBand::from_score(score),
        ignored,
        unanswered,
    }
}

/// Score five answers given in the order of [`Question::ALL`]
pub fn assess_in_order(answers: [&str; 5]) -> RiskAssessment {
    assess(Question::ALL.into_iter().zip(answers))
}
