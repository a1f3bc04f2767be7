//! Fixed guidance used when no gate data resolves at all

use crate::severity::SeverityBand;

pub fn script(band: SeverityBand) -> &'static str {
    match band {
        SeverityBand::Signal => {
            "Something small shifted. Notice it without fixing it; the signal is information, not a verdict."
        }
        SeverityBand::Friction => {
            "There is friction between what you need and what is being asked of you. Reduce one demand before adding any effort."
        }
        SeverityBand::Breakpoint => {
            "This is a breakpoint: the old way of handling it has stopped working. Slow down and choose one thing to change, not everything."
        }
        SeverityBand::Distortion => {
            "The pressure is distorting how things look. Hold off on big conclusions and put your energy into steadying yourself first."
        }
        SeverityBand::Anomaly => {
            "This is far outside your normal range. Protect your basics: rest, food, and one person you can talk to."
        }
    }
}

pub fn experiments(band: SeverityBand) -> &'static [&'static str] {
    match band {
        SeverityBand::Signal => &[
            "Write one sentence about what you noticed",
            "Take a ten minute walk without your phone",
            "Notice when the feeling returns today",
        ],
        SeverityBand::Friction => &[
            "Remove one item from tomorrow's list",
            "Take a short break every ninety minutes",
            "Write down what is being asked of you",
        ],
        SeverityBand::Breakpoint => &[
            "Pick one change and write it down",
            "Talk it through with someone you trust",
            "Block an hour of rest this week",
        ],
        SeverityBand::Distortion => &[
            "Postpone any major decision by 48 hours",
            "Go to bed an hour earlier tonight",
            "Call a friend and describe the facts only",
        ],
        SeverityBand::Anomaly => &[
            "Ask someone to check in on you today",
            "Cancel everything that is not essential",
            "Eat a proper meal and drink water now",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_band_has_content() {
        for band in SeverityBand::ALL {
            assert!(!script(band).is_empty());
            assert_eq!(experiments(band).len(), 3);
        }
    }
}
