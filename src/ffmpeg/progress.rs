use tracing::trace;

/// One block of `-progress pipe:1` output, completed by a `progress=` line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressSample {
    /// Output position in seconds.
    pub out_time: f64,
    /// Realtime multiplier; `None` while ffmpeg reports `N/A`.
    pub speed: Option<f64>,
    pub total_size: u64,
    pub frame: u64,
    pub fps: f64,
    pub bitrate: Option<String>,
    /// Set on the `progress=end` block.
    pub done: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Percent {
    Determinate(f64),
    Indeterminate,
}

/// Accumulates `key=value` lines into samples.
///
/// ffmpeg writes the same position three ways (`out_time_us`, `out_time_ms`
/// which is also microseconds, and `out_time`); the most precise one seen in a
/// block wins.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: ProgressSample,
    time_rank: u8,
}

impl ProgressParser {
    pub fn new() -> Self {
        ProgressParser::default()
    }

    /// Returns a sample when `line` closes a block. Malformed lines are dropped.
    pub fn feed(&mut self, line: &str) -> Option<ProgressSample> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some((key, value)) = line.split_once('=') else {
            trace!("dropping progress line without '=': {:?}", line);
            return None;
        };
        let value = value.trim();
        match key.trim() {
            "frame" => set_parsed(&mut self.current.frame, key, value),
            "fps" => set_parsed(&mut self.current.fps, key, value),
            "total_size" => set_parsed(&mut self.current.total_size, key, value),
            "bitrate" => {
                self.current.bitrate = match value {
                    "N/A" => None,
                    v => Some(String::from(v)),
                };
            },
            "speed" => {
                self.current.speed = parse_speed(value);
            },
            "out_time_us" => self.set_time(3, parse_micros(value), key, value),
            "out_time_ms" => self.set_time(2, parse_micros(value), key, value),
            "out_time" => self.set_time(1, parse_timestamp(value), key, value),
            "progress" => return self.complete(value == "end"),
            _ => (),
        }
        None
    }

    fn set_time(&mut self, rank: u8, seconds: Option<f64>, key: &str, value: &str) {
        match seconds {
            Some(s) if rank >= self.time_rank => {
                self.current.out_time = s;
                self.time_rank = rank;
            },
            Some(_) => (),
            None => trace!("dropping unparseable {}={:?}", key, value),
        }
    }

    fn complete(&mut self, done: bool) -> Option<ProgressSample> {
        let mut sample = self.current.clone();
        sample.done = done;
        self.time_rank = 0;
        if done {
            self.current = ProgressSample::default();
        } else {
            // speed and bitrate describe one block only
            self.current.speed = None;
            self.current.bitrate = None;
        }
        Some(sample)
    }
}

fn set_parsed<T: std::str::FromStr>(field: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(v) => *field = v,
        Err(_) => trace!("dropping unparseable {}={:?}", key, value),
    }
}

fn parse_micros(value: &str) -> Option<f64> {
    value.parse::<i64>().ok().map(|us| us as f64 / 1_000_000.0)
}

fn parse_speed(value: &str) -> Option<f64> {
    value.trim_end_matches('x').trim().parse::<f64>().ok()
}

/// `HH:MM:SS.ffffff`, optionally negative.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours = parts[0].parse::<f64>().ok()?;
    let minutes = parts[1].parse::<f64>().ok()?;
    let seconds = parts[2].parse::<f64>().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    Some(if negative { -total } else { total })
}

/// Maps samples of one file's run to a non-decreasing percentage that always
/// finishes at exactly 100.
#[derive(Debug)]
pub struct ProgressTranslator {
    duration: Option<f64>,
    last: Option<f64>,
    completed: bool,
}

impl ProgressTranslator {
    pub fn new(duration: Option<f64>) -> Self {
        ProgressTranslator {
            duration: duration.filter(|d| d.is_finite() && *d > 0.0),
            last: None,
            completed: false,
        }
    }

    pub fn translate(&mut self, sample: &ProgressSample) -> Option<Percent> {
        if self.completed {
            return None;
        }
        if sample.done {
            return self.finish();
        }
        match self.duration {
            None => Some(Percent::Indeterminate),
            Some(duration) => {
                let percent = (sample.out_time / duration * 100.0).clamp(0.0, 100.0);
                match self.last {
                    Some(last) if percent < last => {
                        trace!("dropping out-of-order sample {:.2}% < {:.2}%", percent, last);
                        None
                    },
                    _ => {
                        self.last = Some(percent);
                        Some(Percent::Determinate(percent))
                    },
                }
            },
        }
    }

    /// The terminal 100%, emitted at most once per run.
    pub fn finish(&mut self) -> Option<Percent> {
        if self.completed {
            return None;
        }
        self.completed = true;
        self.last = Some(100.0);
        Some(Percent::Determinate(100.0))
    }
}
