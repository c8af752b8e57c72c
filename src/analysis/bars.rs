use super::spurts::Spurt;

/// Group spurts into bars of `bar_frames` frames.
///
/// A spurt opens a new bar once it starts at least `bar_frames` after the first
/// spurt of the current bar. The last bucket is always kept, however short.
pub fn split_into_bars(spurts: &[Spurt], bar_frames: f64) -> Vec<Vec<Spurt>> {
    let mut bars = Vec::new();
    let mut current: Vec<Spurt> = Vec::new();
    let mut bar_start = spurts.first().map_or(0, |s| s.start);

    for spurt in spurts {
        if (spurt.start - bar_start) as f64 >= bar_frames && !current.is_empty() {
            bars.push(std::mem::take(&mut current));
            bar_start = spurt.start;
        }
        current.push(*spurt);
    }
    bars.push(current);

    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicks(starts: &[u32]) -> Vec<Spurt> {
        starts.iter().map(|&s| Spurt::new(s, s + 5)).collect()
    }

    #[test]
    fn splits_on_bar_length() {
        let spurts = clicks(&[0, 100, 200, 300, 400, 450, 600, 800, 900]);
        let bars = split_into_bars(&spurts, 400.0);
        let starts: Vec<Vec<u32>> = bars
            .iter()
            .map(|b| b.iter().map(|s| s.start).collect())
            .collect();
        assert_eq!(starts, vec![vec![0, 100, 200, 300], vec![400, 450, 600], vec![800, 900]]);
    }

    #[test]
    fn bar_reference_is_first_spurt_of_the_bar() {
        // 410 opens bar two, so 790 still belongs to it
        let bars = split_into_bars(&clicks(&[0, 410, 790, 820]), 400.0);
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[1].len(), 2);
        assert_eq!(bars[2][0].start, 820);
    }

    #[test]
    fn trailing_partial_bar_is_kept() {
        let bars = split_into_bars(&clicks(&[0, 100, 500]), 400.0);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].len(), 1);
    }

    #[test]
    fn empty_input_gives_one_empty_bar() {
        let bars = split_into_bars(&[], 400.0);
        assert_eq!(bars, vec![Vec::<Spurt>::new()]);
    }
}
