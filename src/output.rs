//! Result stream writer: one compact JSON object per line, flushed per record.

use std::io::{self, Write};

use crate::detect::DetectionResult;

pub struct ResultWriter<W> {
    inner: W,
    /// A failed write left a record fragment without its line terminator.
    line_open: bool,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            line_open: false,
        }
    }

    /// Serialize `result` as a single line and flush it immediately.
    ///
    /// The whole line is built before anything reaches the stream. If an
    /// earlier write died partway through a line, the fragment is terminated
    /// first so this record still starts on a line of its own.
    pub fn write(&mut self, result: &DetectionResult) -> io::Result<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');
        if self.line_open {
            line.insert(0, b'\n');
        }

        let mut written = 0;
        while written < line.len() {
            match self.inner.write(&line[written..]) {
                Ok(0) => {
                    self.track_partial(&line, written);
                    return Err(io::Error::from(io::ErrorKind::WriteZero));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.track_partial(&line, written);
                    return Err(e);
                }
            }
        }
        self.line_open = false;
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn track_partial(&mut self, line: &[u8], written: usize) {
        if written > 0 {
            self.line_open = line[written - 1] != b'\n';
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;

    fn written(result: &DetectionResult) -> String {
        let mut writer = ResultWriter::new(Vec::new());
        writer.write(result).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn untagged_empty_result_keeps_detections_key() {
        assert_eq!(written(&DetectionResult::default()), "{\"detections\":[]}\n");
    }

    #[test]
    fn tagged_result_puts_source_first() {
        let result = DetectionResult::new(
            Some("cam".to_string()),
            vec![Detection {
                label: "person".to_string(),
                confidence: 0.9,
                bbox: [320.0, 240.0, 50.5, 120.0],
            }],
        );
        assert_eq!(
            written(&result),
            "{\"source\":\"cam\",\"detections\":[{\"label\":\"person\",\"confidence\":0.9,\"box\":[320.0,240.0,50.5,120.0]}]}\n"
        );
    }

    #[test]
    fn each_record_is_one_line() {
        let mut writer = ResultWriter::new(Vec::new());
        writer.write(&DetectionResult::default()).unwrap();
        writer
            .write(&DetectionResult::new(Some("a\nb".to_string()), Vec::new()))
            .unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.ends_with('\n'));
    }

    /// Accepts at most `max_chunk` bytes per call and fails on call `fail_on`.
    struct ChoppySink {
        out: Vec<u8>,
        calls: usize,
        fail_on: usize,
        max_chunk: usize,
    }

    impl Write for ChoppySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::Other, "sink hiccup"));
            }
            let n = buf.len().min(self.max_chunk);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn choppy(fail_on: usize) -> ResultWriter<ChoppySink> {
        ResultWriter::new(ChoppySink {
            out: Vec::new(),
            calls: 0,
            fail_on,
            max_chunk: 10,
        })
    }

    #[test]
    fn failed_record_leaves_no_bytes_behind() {
        let mut writer = choppy(3);
        let tagged = DetectionResult::new(Some("cam".to_string()), Vec::new());
        writer.write(&DetectionResult::default()).unwrap();
        assert!(writer.write(&tagged).is_err());
        writer.write(&tagged).unwrap();

        let out = String::from_utf8(writer.into_inner().out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["{\"detections\":[]}", "{\"source\":\"cam\",\"detections\":[]}"]);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).expect("json line");
        }
    }

    #[test]
    fn fragment_from_failed_write_is_terminated_before_next_record() {
        let mut writer = choppy(2);
        assert!(writer.write(&DetectionResult::default()).is_err());
        writer.write(&DetectionResult::default()).unwrap();

        let out = String::from_utf8(writer.into_inner().out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"detectio");
        assert_eq!(lines[1], "{\"detections\":[]}");
        assert!(out.ends_with('\n'));
    }
}
