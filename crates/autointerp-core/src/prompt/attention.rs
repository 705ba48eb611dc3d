//! Attention-pair template. Each sample is its raw token stream with the attended ("to")
//! token in `**..**` and the attending ("from") token in `[[..]]`.

use super::Conversation;
use crate::sample::{argmax, ActivationSample};

pub const SEQUENCE_SEPARATOR: &str = "<|sequence_separator|>";

const SYSTEM: &str = r#"We're studying attention heads in a neural network. Each head looks at every pair of tokens in a short token sequence and activates for pairs of tokens that fit what it is looking for. Attention heads always attend from a token to a token earlier in the sequence (or from a token to itself).

We will display multiple instances of sequences with the "to" token surrounded by double asterisks (e.g., **token**) and the "from" token surrounded by double square brackets (e.g., [[token]]). If a token attends from itself to itself, it will be surrounded by both (e.g., [[**token**]]).

Look at the pairs of tokens the head activates for and summarize in a single sentence what pattern the head is looking for. We do not display every activating pair of tokens in a sequence; you must generalize from limited examples.

Remember, the head always attends to tokens earlier in the sentence (marked with ** **) from tokens later in the sentence (marked with [[ ]]), except when the head attends from a token to itself (marked with [[** **]]).

The explanation takes the form: "This attention head attends to {pattern of tokens marked with ** **, which appear earlier} from {pattern of tokens marked with [[ ]], which appear later}." The explanation does not include any of the markers (** **, [[ ]]), as these are just for your reference.

Sequences are separated by <|sequence_separator|>."#;

pub(crate) const REASONING_DIRECTIVE: &str = "Only respond with the completion of \"this attention head...\", without repeating that phrase and without the ** ** or [[ ]] markers.";

struct Exemplar {
    sequences: &'static [&'static str],
    answer: &'static str,
}

static EXEMPLARS: [Exemplar; 4] = [
    Exemplar {
        sequences: &[
            r#"dreams of a future like her biggest idol, who was also born visually impaired.

"My ultimate dream would be to sing at Carols [by Candlelight**]** and to become a famous musician like Andrea Bocelli[[ ...]] and to show people that if you have a disability it doesn't matter," she said."#,
            r#"omes Ever Sequenced**]**[[
]]
One mystery of cat development is how cats have come to have such varied coats, from solid colours to "mackerel" tabby patterns of thin vertical stripes. The researchers were particularly interested in what turns the mackerel pattern into a "blotched" tabby pattern,"#,
            r#", 6, 8, 4**]**[[':]]rb.sort.slice(1,2); # More advanced, this is Ruby's map and each_with_index # This shows the :rb postfix-operator sugar instead of EVAL "[1,2,3,4]":rb .map(-> $"#,
            r#" him a WN [white nationalist**]** until there is an indication as such[[...]] The fact that he targeted a church gives me an inkling that it was religion-related," wrote WhiteVirginian."#,
            r#" 23**]**
[[
]]While preparing to take the fight to Primordus, Balthazar learned about Taimi's machine and how it could supposedly kill two Elder Dragons with a single blow, which piqued his interest."#,
        ],
        answer: " attends to the latest closing square bracket from arbitrary subsequent tokens.",
    },
    Exemplar {
        sequences: &[
            r#" he said. "Coming off winning the year before, I love playing links** golf**, and I love playing the week before a major. It was tough to miss it. I'm just glad to be back."

Fowler outplayed his partners[[ Rory]] McIlroy (74) and Henrik Stenson (72"#,
            r#" Club:

1. World renowned** golf**[[ course]]

2. Vern Morcom designed golf course

3. Great family holiday destination"#,
            r#"Every** Golf**WRX Member gained yardage with a new[[ Taylor]]Made driver; the largest distance gain was an impressive +10.1 yards,"#,
            r#" of being? Well, having perfected the art of swimming, Phelps has moved on to another cherished summer pastime –** golf**. Here he is participating in the Dunhill Links Championship at Kingsbarns in Scotland today. The[[ greens]] over there are really big, so the opportunity for 50-yard putts exist."#,
            r#"RELATED: Barack Obama joins second D.C.-area** golf** club

"He goes, 'they're freaking crazy looking.' And then he walks up, makes his putt, turns back, walks off the[[ green]], leaves it at that and gives me a wink,""#,
        ],
        answer: " attends to the token \"golf\" from golf-related tokens.",
    },
    Exemplar {
        sequences: &[
            r#" security by requiring the user to enter a numeric code sent to** his** or[[ her]] cellphone in addition to a password. A lot of websites have offered this feature for years, but Intuit just made it widely available earlier this year."#,
            r#" 3 months, they separated the** men** and[[ women]] here. I don't know where they took the men and the children, but they took us women to Syria. They kept us in an underground prison."#,
            r#" an emphasis on the pursuit of power despite interpersonal costs."

The study, which involved over 600 young** men** and[[ women]], makes a strong case for assessing such traits as "ruthless ambition," "discomfort with leadership" and "hubristic pride" to understand psychopathologies."#,
            r#" 4 hours. These results, differ between** men** and[[ women]], however. We can see that although both groups have a large cluster of people at exactly 40 hours per week, there are more men reporting hours above 40, whereas there are more women reporting hours below 40."#,
            r#" they were perceived as more emotional, which made participants more confident in their own opinion."

Ms Salerno said both** men** and[[ women]] reacted in the same way to women expressing themselves angrily."#,
        ],
        answer: " attends to male-related tokens from paired female-related tokens.",
    },
    Exemplar {
        sequences: &[
            r#"Vietnamese[[** Ministry**]] of Foreign Affairs spokesperson Le Hai Binh is seen in this file photo. . Tuoi Tre

The Ministry of Foreign Affairs has ordered a thorough investigation into a case in which a Vietnamese fisherman was shot dead on his boat"#,
            r#" J[[**okin**]]en tells a much different story. He almost sounded like a pitchman.

"All the staff, team service guys, all the trainers, they're unbelievable guys," said Jokinen."#,
            r#" a[[** Pv**]]E game, we probably would use it but based on the tests we've run on it, that wouldn't be our first choice for a live RvR game."#,
            r#"-[[**tun**]]er is also customisable for hassle-free experimentation. The Strix X399-E Gaming takes up to three double-wide cards in SLI or CrossFireX."#,
            r#" to[[** abolish**]] such a complex? Are there ways vegans can eat more sustainably? What are some of the health challenges for new vegans, and how can we raise awareness of these issues"#,
        ],
        answer: " attends from the second token in the sequence to the second token in the sequence.",
    },
];

const OPEN_HEAD: usize = 5;

pub fn render(samples: &[ActivationSample]) -> Conversation {
    let exemplars = EXEMPLARS.iter().enumerate().map(|(idx, exemplar)| {
        let sequences: Vec<String> = exemplar.sequences.iter().map(|s| s.to_string()).collect();
        (render_head(idx + 1, &sequences), exemplar.answer.to_string())
    });
    let sequences: Vec<String> = samples.iter().map(mark_sample).collect();
    Conversation::from_exemplars(SYSTEM, exemplars, render_head(OPEN_HEAD, &sequences))
}

fn render_head(head: usize, sequences: &[String]) -> String {
    let mut out = format!("\n\nAttention head {head}\nActivations:");
    for (idx, sequence) in sequences.iter().enumerate() {
        out.push('\n');
        out.push_str(sequence);
        if idx + 1 < sequences.len() {
            out.push('\n');
            out.push_str(SEQUENCE_SEPARATOR);
        }
    }
    out.push_str(&format!(
        "\nExplanation of attention head {head} behavior: this attention head"
    ));
    out
}

/// Render one sample's token stream with its to/from markers.
pub fn mark_sample(sample: &ActivationSample) -> String {
    let to = sample
        .dfa_values
        .as_deref()
        .and_then(argmax)
        .unwrap_or(0);
    let from = sample.dfa_target_index;

    let mut out = String::new();
    for (idx, token) in sample.tokens.iter().enumerate() {
        let is_to = idx == to;
        let is_from = from == Some(idx);
        match (is_to, is_from) {
            (true, true) => out.push_str(&format!("[[**{token}**]]")),
            (true, false) => out.push_str(&format!("**{token}**")),
            (false, true) => out.push_str(&format!("[[{token}]]")),
            (false, false) => out.push_str(token),
        }
    }
    out
}
