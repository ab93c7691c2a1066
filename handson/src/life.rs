//! Conway's Game of Life on a wrapping board, host reference and device
//! simulation.
//!
//! Boards are stored as one byte per cell, `x + y * nx`. Input files list
//! live cells as `x y 1` lines; the params file holds `nx`, `ny` and the
//! iteration count on successive lines.

use std::fs;
use std::path::Path;

use handson_backend::{
    validate_workgroup, wgpu, DeviceBuffer, GpuContext, Kernel, Launch, Program,
};

use crate::kernels::{render, LIFE_WGSL};
use crate::{LabError, LabResult};

pub const DEAD: u8 = 0;
pub const ALIVE: u8 = 1;

/// Where the final board is written unless told otherwise.
pub const FINAL_STATE_FILE: &str = "final_state.dat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeParams {
    pub nx: usize,
    pub ny: usize,
    pub iterations: usize,
}

impl LifeParams {
    pub fn load(path: &Path) -> LabResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut lines = content.lines();
        let mut next = |line: usize, field: &str| -> LabResult<usize> {
            let raw = lines
                .next()
                .ok_or_else(|| LabError::parse(path, line, format!("missing {}", field)))?;
            raw.trim()
                .parse()
                .map_err(|_| LabError::parse(path, line, format!("invalid {} '{}'", field, raw.trim())))
        };
        let nx = next(1, "nx")?;
        let ny = next(2, "ny")?;
        let iterations = next(3, "iterations")?;
        Ok(Self { nx, ny, iterations })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    nx: usize,
    ny: usize,
    cells: Vec<u8>,
}

impl Board {
    /// An all-dead board.
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            cells: vec![DEAD; nx * ny],
        }
    }

    pub fn load(path: &Path, nx: usize, ny: usize) -> LabResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path, nx, ny)
    }

    fn parse(content: &str, path: &Path, nx: usize, ny: usize) -> LabResult<Self> {
        let mut board = Self::new(nx, ny);
        for (i, raw) in content.lines().enumerate() {
            let line = i + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let values = raw
                .split_whitespace()
                .map(str::parse::<usize>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| LabError::parse(path, line, format!("'{}': {}", raw.trim(), e)))?;
            let &[x, y, s] = values.as_slice() else {
                return Err(LabError::parse(path, line, "expected 'x y state'"));
            };
            if x >= nx {
                return Err(LabError::parse(path, line, "Input x-coord out of range."));
            }
            if y >= ny {
                return Err(LabError::parse(path, line, "Input y-coord out of range."));
            }
            if s != usize::from(ALIVE) {
                return Err(LabError::parse(path, line, "Alive value should be 1."));
            }
            board.cells[x + y * nx] = ALIVE;
        }
        Ok(board)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[x + y * self.nx]
    }

    pub fn set(&mut self, x: usize, y: usize, state: u8) {
        self.cells[x + y * self.nx] = state;
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    /// One row per line, `.` dead and `O` alive.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity((self.nx + 1) * self.ny);
        for row in self.cells.chunks(self.nx.max(1)).take(self.ny) {
            out.extend(row.iter().map(|&c| if c == DEAD { '.' } else { 'O' }));
            out.push('\n');
        }
        out
    }

    /// Live cells as `x y 1` lines, row by row.
    pub fn save(&self, path: &Path) -> LabResult<()> {
        let mut out = String::new();
        for y in 0..self.ny {
            for x in 0..self.nx {
                if self.get(x, y) == ALIVE {
                    out.push_str(&format!("{} {} {}\n", x, y, ALIVE));
                }
            }
        }
        fs::write(path, out)?;
        Ok(())
    }

    /// Next generation; every edge wraps.
    pub fn step(&self) -> Board {
        let (nx, ny) = (self.nx, self.ny);
        let mut next = Board::new(nx, ny);
        for y in 0..ny {
            let up = (y + ny - 1) % ny;
            let down = (y + 1) % ny;
            for x in 0..nx {
                let left = (x + nx - 1) % nx;
                let right = (x + 1) % nx;
                let neighbours = [
                    (left, up),
                    (x, up),
                    (right, up),
                    (left, y),
                    (right, y),
                    (left, down),
                    (x, down),
                    (right, down),
                ]
                .iter()
                .filter(|&&(cx, cy)| self.get(cx, cy) == ALIVE)
                .count();
                let alive = self.get(x, y) == ALIVE;
                if neighbours == 3 || (alive && neighbours == 2) {
                    next.set(x, y, ALIVE);
                }
            }
        }
        next
    }

    fn to_words(&self) -> Vec<u32> {
        self.cells.iter().map(|&c| u32::from(c)).collect()
    }

    fn from_words(nx: usize, ny: usize, words: &[u32]) -> Self {
        Self {
            nx,
            ny,
            cells: words.iter().map(|&w| if w == 0 { DEAD } else { ALIVE }).collect(),
        }
    }
}

/// The life kernel specialised for one board shape and block size.
pub struct LifeSimulation<'a> {
    ctx: &'a GpuContext,
    nx: usize,
    ny: usize,
    groups: (u32, u32),
    kernel: Kernel,
    dims: wgpu::Buffer,
}

impl<'a> LifeSimulation<'a> {
    pub fn new(ctx: &'a GpuContext, nx: usize, ny: usize, bx: u32, by: u32) -> LabResult<Self> {
        if nx == 0 || ny == 0 || bx == 0 || by == 0 {
            return Err(LabError::InvalidParams(format!(
                "board {}x{} and block {}x{} must be non-empty",
                nx, ny, bx, by
            )));
        }
        let too_large = |_| LabError::InvalidParams(format!("board {}x{} too large", nx, ny));
        let nx32 = u32::try_from(nx).map_err(too_large)?;
        let ny32 = u32::try_from(ny).map_err(too_large)?;
        if nx32 % bx != 0 || ny32 % by != 0 {
            return Err(LabError::InvalidParams(format!(
                "block {}x{} must divide the board {}x{}",
                bx, by, nx, ny
            )));
        }
        validate_workgroup(ctx, (bx, by, 1))?;

        let tile = (bx + 2) * (by + 2);
        if tile * 4 > ctx.max_workgroup_storage() {
            return Err(LabError::InvalidParams(format!(
                "a {}x{} block with halo needs {} bytes of work-group memory",
                bx, by, tile * 4
            )));
        }
        let groups = (nx32 / bx, ny32 / by);
        let max = ctx.limits().max_compute_workgroups_per_dimension;
        if groups.0 > max || groups.1 > max {
            return Err(LabError::InvalidParams(format!(
                "{}x{} work-groups exceed the device limit of {}",
                groups.0, groups.1, max
            )));
        }

        let source = render(
            LIFE_WGSL,
            &[("BX", bx), ("BY", by), ("TW", bx + 2), ("TILE", tile)],
        );
        let kernel = Program::build(ctx, "life", &source)?.kernel(ctx, "accelerate_life")?;
        let dims = ctx.uniform("life dims", &[nx32, ny32, 0u32, 0]);

        Ok(Self {
            ctx,
            nx,
            ny,
            groups,
            kernel,
            dims,
        })
    }

    /// Advances `board` by `iterations` generations in one submission.
    pub fn run(&self, board: &Board, iterations: usize) -> LabResult<Board> {
        if board.nx != self.nx || board.ny != self.ny {
            return Err(LabError::InvalidParams(format!(
                "board is {}x{}, simulation expects {}x{}",
                board.nx, board.ny, self.nx, self.ny
            )));
        }
        if iterations == 0 {
            return Ok(board.clone());
        }

        let ctx = self.ctx;
        let tick = DeviceBuffer::from_slice(ctx, "tick", &board.to_words());
        let tock = DeviceBuffer::<u32>::empty(ctx, self.nx * self.ny);

        let forward = self
            .kernel
            .bind(ctx, &[tick.buffer(), tock.buffer(), &self.dims]);
        let backward = self
            .kernel
            .bind(ctx, &[tock.buffer(), tick.buffer(), &self.dims]);
        let grid = (self.groups.0, self.groups.1, 1);

        let launches: Vec<Launch<'_>> = (0..iterations)
            .map(|i| {
                let bind_group = if i % 2 == 0 { &forward } else { &backward };
                Launch::new(&self.kernel, bind_group, grid)
            })
            .collect();
        ctx.enqueue(&launches);
        log::debug!("life: {} generations queued", iterations);

        let last = if iterations % 2 == 1 { &tock } else { &tick };
        let words = last.read(ctx)?;
        Ok(Board::from_words(self.nx, self.ny, &words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from(nx: usize, ny: usize, alive: &[(usize, usize)]) -> Board {
        let mut board = Board::new(nx, ny);
        for &(x, y) in alive {
            board.set(x, y, ALIVE);
        }
        board
    }

    #[test]
    fn blinker_oscillates() {
        let horizontal = board_from(5, 5, &[(1, 2), (2, 2), (3, 2)]);
        let vertical = board_from(5, 5, &[(2, 1), (2, 2), (2, 3)]);
        assert_eq!(horizontal.step(), vertical);
        assert_eq!(vertical.step(), horizontal);
    }

    #[test]
    fn glider_wraps_around_the_torus() {
        let glider = board_from(8, 8, &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]);
        let mut board = glider.clone();
        // A glider moves one cell diagonally every four generations.
        for _ in 0..32 {
            board = board.step();
        }
        assert_eq!(board, glider);
        assert_eq!(board.alive_count(), 5);
    }

    #[test]
    fn render_uses_dots_and_ohs() {
        let board = board_from(3, 2, &[(0, 0), (2, 1)]);
        assert_eq!(board.render(), "O..\n..O\n");
    }

    #[test]
    fn load_and_save_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.dat");
        fs::write(&path, "1 0 1\n\n0 2 1\n").unwrap();

        let board = Board::load(&path, 4, 4).unwrap();
        assert_eq!(board.alive_count(), 2);
        assert_eq!(board.get(1, 0), ALIVE);

        let out = dir.path().join(FINAL_STATE_FILE);
        board.save(&out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "1 0 1\n0 2 1\n");
        assert_eq!(Board::load(&out, 4, 4).unwrap(), board);
    }

    #[test]
    fn load_errors_carry_line_numbers() {
        let path = Path::new("board.dat");
        let cases = [
            ("0 0 1\n9 0 1\n", 2, "x-coord"),
            ("0 0 1\n0 0 1\n0 7 1\n", 3, "y-coord"),
            ("0 0 2\n", 1, "Alive value"),
            ("0 0\n", 1, "expected"),
            ("a b c\n", 1, "'a b c'"),
        ];
        for (content, expected_line, fragment) in cases {
            match Board::parse(content, path, 4, 4) {
                Err(LabError::Parse { line, message, .. }) => {
                    assert_eq!(line, expected_line, "{}", content);
                    assert!(message.contains(fragment), "{}", message);
                }
                other => panic!("expected parse error, got {:?}", other),
            }
        }
    }

    #[test]
    fn params_name_the_bad_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("life.params");
        fs::write(&path, "16\n8\n100\n").unwrap();
        assert_eq!(
            LifeParams::load(&path).unwrap(),
            LifeParams {
                nx: 16,
                ny: 8,
                iterations: 100
            }
        );

        fs::write(&path, "16\n8\n").unwrap();
        let err = LifeParams::load(&path).unwrap_err();
        assert!(err.to_string().contains("missing iterations"));

        fs::write(&path, "16\nwide\n3\n").unwrap();
        let err = LifeParams::load(&path).unwrap_err();
        assert!(err.to_string().contains(":2: invalid ny"));
    }
}
